//! Order-level models: trade direction, order requests and fills.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// The side that offsets this one.
    pub fn opposite(&self) -> Self {
        match self {
            TradeSide::Buy => TradeSide::Sell,
            TradeSide::Sell => TradeSide::Buy,
        }
    }

    /// +1 for Buy, -1 for Sell. Used to put price offsets on the right side.
    pub fn sign(&self) -> f64 {
        match self {
            TradeSide::Buy => 1.0,
            TradeSide::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to open a new position at market.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub side: TradeSide,
    pub volume: Decimal,
    /// Quote the order is priced against (ask for Buy, bid for Sell)
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Maximum accepted slippage in points
    pub deviation: u32,
    pub comment: String,
}

/// Request to close (part of) an open position at market.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseOrder {
    pub ticket: u64,
    /// Side of the position being closed
    pub position_side: TradeSide,
    pub volume: Decimal,
    /// Bid when closing a long, ask when closing a short
    pub price: f64,
    pub deviation: u32,
    pub comment: String,
}

/// Confirmed execution of an open order.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub ticket: u64,
    pub price: f64,
    pub volume: Decimal,
    pub filled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_helpers() {
        assert_eq!(TradeSide::Buy.opposite(), TradeSide::Sell);
        assert_eq!(TradeSide::Sell.opposite(), TradeSide::Buy);
        assert_eq!(TradeSide::Buy.sign(), 1.0);
        assert_eq!(TradeSide::Sell.sign(), -1.0);
        assert_eq!(TradeSide::Sell.to_string(), "SELL");
    }
}
