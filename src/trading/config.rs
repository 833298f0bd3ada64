//! Risk and trading-window configuration.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Risk parameters for sizing and managing the position.
///
/// Distances are expressed in pips and converted with `pip_size`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Lot used by fixed sizing, and the fallback full lot for partial closes
    pub lot: Decimal,

    /// Which lot sizing method to use ("fixed" or "percent_risk")
    pub sizing_method: String,

    /// Fraction of balance risked per trade under percent-risk sizing (0.01 = 1%)
    pub risk_percent: f64,

    /// Price size of one pip
    pub pip_size: f64,

    /// Stop-loss distance = ATR x this, before clamping
    pub sl_atr_multiplier: f64,

    /// Take-profit distance = ATR x this, before clamping
    pub tp_atr_multiplier: f64,

    pub min_sl_pips: f64,
    pub max_sl_pips: f64,
    pub min_tp_pips: f64,
    pub max_tp_pips: f64,

    /// Trailing distance = max(ATR x this, min_trailing_pips)
    pub trailing_atr_multiplier: f64,
    pub min_trailing_pips: f64,

    /// Profit (pips) a position must exceed before the partial close fires
    pub partial_close_trigger_pips: f64,

    /// Fraction of current volume closed by the partial close (0.5 = 50%)
    pub partial_close_fraction: Decimal,

    /// Slippage accepted when opening, in points
    pub open_deviation: u32,

    /// Slippage accepted when closing, in points
    pub close_deviation: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            lot: dec!(0.10),
            sizing_method: "fixed".to_string(),
            risk_percent: 0.01,
            pip_size: 0.0001,
            sl_atr_multiplier: 1.5,
            tp_atr_multiplier: 2.5,
            min_sl_pips: 15.0,
            max_sl_pips: 50.0,
            min_tp_pips: 20.0,
            max_tp_pips: 80.0,
            trailing_atr_multiplier: 1.0,
            min_trailing_pips: 10.0,
            partial_close_trigger_pips: 30.0,
            partial_close_fraction: dec!(0.5),
            open_deviation: 10,
            close_deviation: 50,
        }
    }
}

/// Time-of-day and weekday gate for new positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingWindow {
    /// First hour (inclusive) new positions may be opened
    pub start_hour: u32,

    /// Hour (exclusive) new positions stop being opened
    pub end_hour: u32,

    /// Days the window is open
    pub weekdays: Vec<Weekday>,

    /// Keep trailing stops and partial closes running outside the window
    pub manage_outside_window: bool,
}

impl Default for TradingWindow {
    fn default() -> Self {
        Self {
            start_hour: 6,
            end_hour: 22,
            weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            manage_outside_window: true,
        }
    }
}

impl TradingWindow {
    /// Whether new positions may be opened at `now`.
    ///
    /// `start_hour > end_hour` describes a window that wraps past midnight.
    pub fn contains<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        if !self.weekdays.contains(&now.weekday()) {
            return false;
        }
        let hour = now.hour();
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    /// Whether open-position management runs at `now`.
    pub fn allows_management<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        self.manage_outside_window || self.contains(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        // 2024-01-01 is a Monday
        Utc.with_ymd_and_hms(2024, 1, day, hour, 15, 0).unwrap()
    }

    #[test]
    fn test_window_hours() {
        let window = TradingWindow::default();

        assert!(!window.contains(&at(1, 5)));
        assert!(window.contains(&at(1, 6)));
        assert!(window.contains(&at(1, 21)));
        assert!(!window.contains(&at(1, 22)));
    }

    #[test]
    fn test_window_weekdays() {
        let window = TradingWindow::default();

        assert!(window.contains(&at(5, 12))); // Friday
        assert!(!window.contains(&at(6, 12))); // Saturday
        assert!(!window.contains(&at(7, 12))); // Sunday
    }

    #[test]
    fn test_window_wraps_midnight() {
        let window = TradingWindow {
            start_hour: 22,
            end_hour: 6,
            ..Default::default()
        };

        assert!(window.contains(&at(2, 23)));
        assert!(window.contains(&at(2, 3)));
        assert!(!window.contains(&at(2, 12)));
    }

    #[test]
    fn test_management_outside_window() {
        let mut window = TradingWindow::default();
        assert!(window.allows_management(&at(6, 12)));

        window.manage_outside_window = false;
        assert!(!window.allows_management(&at(6, 12)));
        assert!(window.allows_management(&at(1, 12)));
    }
}
