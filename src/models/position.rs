//! Live exposure on the traded symbol.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Quote, TradeSide};

/// Side of the current exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
    #[default]
    Flat,
}

impl PositionSide {
    /// Order side that opened this exposure, `None` when flat.
    pub fn trade_side(&self) -> Option<TradeSide> {
        match self {
            PositionSide::Long => Some(TradeSide::Buy),
            PositionSide::Short => Some(TradeSide::Sell),
            PositionSide::Flat => None,
        }
    }
}

impl From<TradeSide> for PositionSide {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Buy => PositionSide::Long,
            TradeSide::Sell => PositionSide::Short,
        }
    }
}

/// The single position held on the instrument. Flat is a position too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    /// Terminal ticket, `None` when flat
    pub ticket: Option<u64>,

    pub side: PositionSide,

    /// Current volume in lots
    pub volume: Decimal,

    /// Volume the position was opened with
    pub initial_volume: Decimal,

    pub entry_price: f64,

    /// Current stop-loss price
    pub stop_loss: Option<f64>,

    /// Current take-profit price
    pub take_profit: Option<f64>,

    pub opened_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat || self.volume <= Decimal::ZERO
    }

    /// Unrealized move from entry, in price units, valued at the exit side of `quote`.
    /// Positive when the position is in profit.
    pub fn profit_distance(&self, quote: &Quote) -> f64 {
        match self.side.trade_side() {
            Some(side) => (quote.exit_price(side) - self.entry_price) * side.sign(),
            None => 0.0,
        }
    }

    /// Apply a confirmed partial close.
    pub fn reduce(&mut self, volume: Decimal) {
        self.volume = (self.volume - volume).max(Decimal::ZERO);
        if self.volume.is_zero() {
            *self = Position::flat();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long(volume: Decimal) -> Position {
        Position {
            ticket: Some(7),
            side: PositionSide::Long,
            volume,
            initial_volume: volume,
            entry_price: 1.1000,
            stop_loss: Some(1.0985),
            take_profit: Some(1.1025),
            opened_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_profit_distance_by_side() {
        let quote = Quote { bid: 1.1031, ask: 1.1033 };
        let pos = long(dec!(0.10));
        assert!((pos.profit_distance(&quote) - 0.0031).abs() < 1e-9);

        let short = Position { side: PositionSide::Short, ..long(dec!(0.10)) };
        assert!((short.profit_distance(&quote) + 0.0033).abs() < 1e-9);

        assert_eq!(Position::flat().profit_distance(&quote), 0.0);
    }

    #[test]
    fn test_reduce_to_zero_goes_flat() {
        let mut pos = long(dec!(0.10));
        pos.reduce(dec!(0.05));
        assert_eq!(pos.volume, dec!(0.05));
        assert_eq!(pos.side, PositionSide::Long);

        pos.reduce(dec!(0.05));
        assert!(pos.is_flat());
        assert_eq!(pos.ticket, None);
    }
}
