//! Lot sizing and broker volume validation.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::TradingConfig;
use crate::error::TradeError;
use crate::models::SymbolConstraints;

/// Alignment tolerance for `(lot - min_vol)` against `step_vol`.
const STEP_TOLERANCE: Decimal = dec!(0.00000001);

/// Position sizing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingMethod {
    /// Configured lot on every trade
    Fixed,
    /// Lot chosen so the stop-loss loses `risk_percent` of balance
    PercentRisk,
}

impl SizingMethod {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "percent_risk" | "percent" | "risk" => Self::PercentRisk,
            _ => Self::Fixed,
        }
    }
}

/// Calculator for trade volume.
pub struct PositionSizer {
    config: TradingConfig,
    method: SizingMethod,
}

impl PositionSizer {
    pub fn new(config: TradingConfig) -> Self {
        let method = SizingMethod::from_str(&config.sizing_method);
        Self { config, method }
    }

    pub fn method(&self) -> SizingMethod {
        self.method
    }

    /// Lot for a new position.
    ///
    /// # Arguments
    /// * `balance` - Account balance, only read by percent-risk sizing
    /// * `sl_distance` - Stop-loss distance in price units
    /// * `symbol` - Broker volume and tick constraints
    pub fn lot_size(&self, balance: f64, sl_distance: f64, symbol: &SymbolConstraints) -> Decimal {
        match self.method {
            SizingMethod::Fixed => self.config.lot,
            SizingMethod::PercentRisk => self.percent_risk_lot(balance, sl_distance, symbol),
        }
    }

    /// lot = balance * risk% / (sl_distance / point * tick_value)
    ///
    /// Rounded down to the volume step and clamped to broker bounds. Falls
    /// back to the configured lot when the inputs cannot produce a size.
    fn percent_risk_lot(&self, balance: f64, sl_distance: f64, symbol: &SymbolConstraints) -> Decimal {
        let loss_per_lot = sl_distance / symbol.point * symbol.tick_value;
        if balance <= 0.0 || !loss_per_lot.is_finite() || loss_per_lot <= 0.0 {
            return self.config.lot;
        }

        let raw = balance * self.config.risk_percent / loss_per_lot;
        let Some(raw) = Decimal::from_f64(raw) else {
            return self.config.lot;
        };

        floor_to_step(raw, symbol)
            .max(symbol.min_vol)
            .min(symbol.max_vol)
    }
}

/// Round `volume` down onto the `min_vol + k * step_vol` grid.
pub fn floor_to_step(volume: Decimal, symbol: &SymbolConstraints) -> Decimal {
    if symbol.step_vol <= Decimal::ZERO || volume < symbol.min_vol {
        return volume;
    }
    let steps = ((volume - symbol.min_vol) / symbol.step_vol).floor();
    (symbol.min_vol + steps * symbol.step_vol).normalize()
}

/// Reject a lot that breaks `min_vol <= lot <= max_vol` or is not aligned
/// to `step_vol` from `min_vol` within 1e-8.
pub fn validate_lot(lot: Decimal, symbol: &SymbolConstraints) -> Result<(), TradeError> {
    if symbol.step_vol <= Decimal::ZERO {
        return Err(TradeError::Validation(format!(
            "Invalid volume step {} for lot {}",
            symbol.step_vol, lot
        )));
    }
    if lot < symbol.min_vol || lot > symbol.max_vol {
        return Err(TradeError::Validation(format!(
            "Lot {} outside [{}, {}]",
            lot, symbol.min_vol, symbol.max_vol
        )));
    }

    let steps = ((lot - symbol.min_vol) / symbol.step_vol).round();
    let aligned = symbol.min_vol + steps * symbol.step_vol;
    if (aligned - lot).abs() > STEP_TOLERANCE {
        return Err(TradeError::Validation(format!(
            "Lot {} not aligned to step {} from {}",
            lot, symbol.step_vol, symbol.min_vol
        )));
    }
    Ok(())
}

/// Lots as f64 for logging and the terminal wire format.
pub fn lots_f64(volume: Decimal) -> f64 {
    volume.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eurusd() -> SymbolConstraints {
        SymbolConstraints {
            min_vol: dec!(0.01),
            max_vol: dec!(100),
            step_vol: dec!(0.01),
            point: 0.00001,
            tick_value: 1.0,
            digits: 5,
        }
    }

    #[test]
    fn test_validate_lot_bounds() {
        let symbol = eurusd();

        assert!(validate_lot(dec!(0.10), &symbol).is_ok());
        assert!(validate_lot(dec!(0.01), &symbol).is_ok());
        assert!(validate_lot(dec!(100), &symbol).is_ok());
        assert!(validate_lot(dec!(0.005), &symbol).is_err());
        assert!(validate_lot(dec!(100.01), &symbol).is_err());
    }

    #[test]
    fn test_validate_lot_alignment() {
        let symbol = SymbolConstraints {
            min_vol: dec!(0.1),
            step_vol: dec!(0.05),
            ..eurusd()
        };

        assert!(validate_lot(dec!(0.15), &symbol).is_ok());
        assert!(validate_lot(dec!(0.15000000001), &symbol).is_ok());

        // Misaligned on either side of a step
        let err = validate_lot(dec!(0.17), &symbol).unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));
        assert!(validate_lot(dec!(0.13), &symbol).is_err());
        assert!(validate_lot(dec!(0.1500001), &symbol).is_err());
    }

    #[test]
    fn test_validate_lot_rejects_bad_step() {
        let symbol = SymbolConstraints {
            step_vol: Decimal::ZERO,
            ..eurusd()
        };
        assert!(validate_lot(dec!(0.10), &symbol).is_err());
    }

    #[test]
    fn test_fixed_sizing() {
        let sizer = PositionSizer::new(TradingConfig::default());

        assert_eq!(sizer.method(), SizingMethod::Fixed);
        assert_eq!(sizer.lot_size(10_000.0, 0.0015, &eurusd()), dec!(0.10));
    }

    #[test]
    fn test_percent_risk_sizing() {
        let config = TradingConfig {
            sizing_method: "percent_risk".to_string(),
            risk_percent: 0.01,
            ..Default::default()
        };
        let sizer = PositionSizer::new(config);

        // 150 points * $1 per point per lot = $150 risk per lot; $100 / $150 = 0.666
        let lot = sizer.lot_size(10_000.0, 0.0015, &eurusd());
        assert_eq!(lot, dec!(0.66));
        assert!(validate_lot(lot, &eurusd()).is_ok());

        // Tiny balance clamps up to the minimum volume
        assert_eq!(sizer.lot_size(1.0, 0.0015, &eurusd()), dec!(0.01));
    }

    #[test]
    fn test_floor_to_step() {
        let symbol = eurusd();
        assert_eq!(floor_to_step(dec!(0.055), &symbol), dec!(0.05));
        assert_eq!(floor_to_step(dec!(0.05), &symbol), dec!(0.05));
        assert_eq!(floor_to_step(dec!(0.005), &symbol), dec!(0.005));
    }
}
