//! Instrument metadata and quotes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradeSide;

/// Current bid/ask for the traded symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    /// A zero or negative side means the terminal has no price.
    pub fn is_valid(&self) -> bool {
        self.bid > 0.0 && self.ask > 0.0 && self.bid.is_finite() && self.ask.is_finite()
    }

    /// Price an order on `side` executes at.
    pub fn entry_price(&self, side: TradeSide) -> f64 {
        match side {
            TradeSide::Buy => self.ask,
            TradeSide::Sell => self.bid,
        }
    }

    /// Price a position on `side` is valued (and closed) at.
    pub fn exit_price(&self, side: TradeSide) -> f64 {
        match side {
            TradeSide::Buy => self.bid,
            TradeSide::Sell => self.ask,
        }
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Broker-imposed trading constraints for the symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolConstraints {
    pub min_vol: Decimal,
    pub max_vol: Decimal,
    pub step_vol: Decimal,
    /// Smallest price increment
    pub point: f64,
    /// Account-currency value of one tick move for one lot
    pub tick_value: f64,
    /// Price decimals
    pub digits: u32,
}

impl SymbolConstraints {
    /// Round a price to the symbol's point grid.
    pub fn normalize_price(&self, price: f64) -> f64 {
        if self.point <= 0.0 {
            return price;
        }
        let factor = 10f64.powi(self.digits as i32);
        ((price / self.point).round() * self.point * factor).round() / factor
    }
}
