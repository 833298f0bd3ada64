//! Dynamic risk management: ATR-scaled entry levels, trailing stop, partial close.

use rust_decimal::Decimal;
use tracing::debug;

use super::position_sizer::{floor_to_step, SizingMethod};
use super::TradingConfig;
use crate::models::{Position, Quote, SymbolConstraints, TradeSide};

/// Stop-loss and take-profit for a new position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Distances in price units
    pub sl_distance: f64,
    pub tp_distance: f64,
    pub sl_pips: f64,
    pub tp_pips: f64,
    /// tp_pips / sl_pips, reported only
    pub risk_reward: f64,
}

/// Accepted stop-loss move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingUpdate {
    pub new_stop_loss: f64,
    pub previous_stop_loss: Option<f64>,
    pub trailing_distance: f64,
}

/// Requested reduction of an open position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialClose {
    pub volume: Decimal,
    pub profit_pips: f64,
}

/// Risk manager. Pure functions of prices, volatility and configuration.
pub struct RiskManager {
    config: TradingConfig,
}

impl RiskManager {
    pub fn new(config: TradingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    pub fn pips_to_price(&self, pips: f64) -> f64 {
        pips * self.config.pip_size
    }

    pub fn price_to_pips(&self, distance: f64) -> f64 {
        distance / self.config.pip_size
    }

    pub fn sl_distance(&self, atr: f64) -> f64 {
        (atr * self.config.sl_atr_multiplier)
            .max(self.pips_to_price(self.config.min_sl_pips))
            .min(self.pips_to_price(self.config.max_sl_pips))
    }

    pub fn tp_distance(&self, atr: f64) -> f64 {
        (atr * self.config.tp_atr_multiplier)
            .max(self.pips_to_price(self.config.min_tp_pips))
            .min(self.pips_to_price(self.config.max_tp_pips))
    }

    pub fn trailing_distance(&self, atr: f64) -> f64 {
        (atr * self.config.trailing_atr_multiplier).max(self.pips_to_price(self.config.min_trailing_pips))
    }

    /// SL behind and TP ahead of `fill_price` for `side`.
    pub fn entry_levels(&self, side: TradeSide, fill_price: f64, atr: f64) -> EntryLevels {
        let sl_distance = self.sl_distance(atr);
        let tp_distance = self.tp_distance(atr);
        let sl_pips = self.price_to_pips(sl_distance);
        let tp_pips = self.price_to_pips(tp_distance);

        EntryLevels {
            stop_loss: fill_price - side.sign() * sl_distance,
            take_profit: fill_price + side.sign() * tp_distance,
            sl_distance,
            tp_distance,
            sl_pips,
            tp_pips,
            risk_reward: ((tp_pips / sl_pips) * 100.0).round() / 100.0,
        }
    }

    /// New stop-loss trailing the exit-side price by the trailing distance.
    ///
    /// Accepted only if strictly more favorable than the current stop and
    /// still on the losing side of the current price. The candidate is
    /// rounded to the symbol point before comparison.
    pub fn trailing_stop(
        &self,
        position: &Position,
        quote: &Quote,
        atr: f64,
        symbol: &SymbolConstraints,
    ) -> Option<TrailingUpdate> {
        let side = position.side.trade_side()?;
        let price = quote.exit_price(side);
        let trailing_distance = self.trailing_distance(atr);
        let candidate = symbol.normalize_price(price - side.sign() * trailing_distance);

        let improves = match (side, position.stop_loss) {
            (_, None) => true,
            (TradeSide::Buy, Some(sl)) => candidate > sl,
            (TradeSide::Sell, Some(sl)) => candidate < sl,
        };
        let keeps_open = match side {
            TradeSide::Buy => candidate < price,
            TradeSide::Sell => candidate > price,
        };

        if !improves || !keeps_open {
            debug!(
                candidate = candidate,
                current_sl = ?position.stop_loss,
                price = price,
                "Trailing stop not moved"
            );
            return None;
        }

        Some(TrailingUpdate {
            new_stop_loss: candidate,
            previous_stop_loss: position.stop_loss,
            trailing_distance,
        })
    }

    /// Volume the position was opened with. When the terminal does not report
    /// it, only fixed sizing can vouch for it (the configured lot).
    fn opening_volume(&self, position: &Position) -> Option<Decimal> {
        if position.initial_volume > Decimal::ZERO {
            return Some(position.initial_volume);
        }
        match SizingMethod::from_str(&self.config.sizing_method) {
            SizingMethod::Fixed => Some(self.config.lot),
            SizingMethod::PercentRisk => None,
        }
    }

    /// Partial close once profit exceeds the trigger, while the position still
    /// holds its full opening volume.
    ///
    /// "Already reduced" is read from `volume < full_volume`, so the check is
    /// idempotent across ticks and restarts. Returns `None` when the resulting
    /// close or remainder would fall below the broker minimum.
    pub fn partial_close(
        &self,
        position: &Position,
        quote: &Quote,
        symbol: &SymbolConstraints,
    ) -> Option<PartialClose> {
        if position.is_flat() {
            return None;
        }

        let profit_pips = self.price_to_pips(position.profit_distance(quote));
        if profit_pips <= self.config.partial_close_trigger_pips {
            return None;
        }

        let full_volume = match self.opening_volume(position) {
            Some(volume) => volume,
            None => {
                debug!(
                    volume = %position.volume,
                    "Opening volume unknown under risk sizing, no partial close"
                );
                return None;
            }
        };
        if position.volume < full_volume {
            return None;
        }

        let volume = floor_to_step(position.volume * self.config.partial_close_fraction, symbol);
        let remainder = position.volume - volume;
        if volume < symbol.min_vol || remainder < symbol.min_vol {
            debug!(
                volume = %position.volume,
                close = %volume,
                min_vol = %symbol.min_vol,
                "Partial close too small for broker minimum"
            );
            return None;
        }

        Some(PartialClose {
            volume,
            profit_pips,
        })
    }
}
