//! Indicator engine: derives trend, momentum and volatility readings from a bar window.

mod momentum;
mod trend;
mod volatility;

pub use momentum::Stochastic;
pub use trend::Macd;
pub use volatility::Bollinger;

use momentum::{rsi, stochastic, williams_r};
use trend::{ema, macd, sma};
use volatility::{atr, bollinger};

use serde::{Deserialize, Serialize};

use crate::error::TradeError;
use crate::models::BarSeries;

/// Lookback periods for every indicator the strategy reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub sma_long: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_slow: usize,
    pub rsi_fast: usize,
    pub stoch_k: usize,
    pub stoch_slow_k: usize,
    pub stoch_slow_d: usize,
    pub williams_r: usize,
    pub atr: usize,
    /// Window of the ATR average used by the spike filter
    pub atr_average: usize,
    pub bollinger: usize,
    pub bollinger_width: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_fast: 10,
            ema_slow: 21,
            sma_long: 50,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            rsi_slow: 14,
            rsi_fast: 7,
            stoch_k: 14,
            stoch_slow_k: 3,
            stoch_slow_d: 3,
            williams_r: 14,
            atr: 14,
            atr_average: 10,
            bollinger: 20,
            bollinger_width: 2.0,
        }
    }
}

/// Full indicator sequences for one bar window, aligned with the bars.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSet {
    pub close: Vec<f64>,
    pub ema_fast: Vec<f64>,
    pub ema_slow: Vec<f64>,
    pub sma_long: Vec<f64>,
    pub macd: Macd,
    pub rsi_slow: Vec<f64>,
    pub rsi_fast: Vec<f64>,
    pub stochastic: Stochastic,
    pub williams_r: Vec<f64>,
    pub atr: Vec<f64>,
    pub atr_average: Vec<f64>,
    pub bollinger: Bollinger,
}

impl IndicatorSet {
    pub fn compute(bars: &BarSeries, params: &IndicatorParams) -> Self {
        let close = bars.closes();
        let high = bars.highs();
        let low = bars.lows();

        let atr_series = atr(&high, &low, &close, params.atr);
        let atr_average = sma(&atr_series, params.atr_average);

        Self {
            ema_fast: ema(&close, params.ema_fast),
            ema_slow: ema(&close, params.ema_slow),
            sma_long: sma(&close, params.sma_long),
            macd: macd(&close, params.macd_fast, params.macd_slow, params.macd_signal),
            rsi_slow: rsi(&close, params.rsi_slow),
            rsi_fast: rsi(&close, params.rsi_fast),
            stochastic: stochastic(
                &high,
                &low,
                &close,
                params.stoch_k,
                params.stoch_slow_k,
                params.stoch_slow_d,
            ),
            williams_r: williams_r(&high, &low, &close, params.williams_r),
            atr: atr_series,
            atr_average,
            bollinger: bollinger(&close, params.bollinger, params.bollinger_width),
            close,
        }
    }

    /// Named view of every sequence.
    pub fn series(&self) -> Vec<(&'static str, &[f64])> {
        vec![
            ("close", self.close.as_slice()),
            ("ema_fast", self.ema_fast.as_slice()),
            ("ema_slow", self.ema_slow.as_slice()),
            ("sma_long", self.sma_long.as_slice()),
            ("macd_line", self.macd.line.as_slice()),
            ("macd_signal", self.macd.signal.as_slice()),
            ("macd_hist", self.macd.histogram.as_slice()),
            ("rsi_slow", self.rsi_slow.as_slice()),
            ("rsi_fast", self.rsi_fast.as_slice()),
            ("stoch_k", self.stochastic.k.as_slice()),
            ("stoch_d", self.stochastic.d.as_slice()),
            ("williams_r", self.williams_r.as_slice()),
            ("atr", self.atr.as_slice()),
            ("atr_average", self.atr_average.as_slice()),
            ("bb_upper", self.bollinger.upper.as_slice()),
            ("bb_middle", self.bollinger.middle.as_slice()),
            ("bb_lower", self.bollinger.lower.as_slice()),
        ]
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.series()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, s)| s)
    }

    /// Latest value of every indicator.
    ///
    /// Fails with `IndicatorUnavailable` naming the first indicator whose
    /// trailing value is NaN (warm-up not finished).
    pub fn snapshot(&self) -> Result<IndicatorSnapshot, TradeError> {
        let latest = |name: &str, series: &[f64]| -> Result<f64, TradeError> {
            match series.last() {
                Some(v) if v.is_finite() => Ok(*v),
                _ => Err(TradeError::IndicatorUnavailable(format!(
                    "{} has no value for the latest bar",
                    name
                ))),
            }
        };

        Ok(IndicatorSnapshot {
            close: latest("close", &self.close)?,
            ema_fast: latest("ema_fast", &self.ema_fast)?,
            ema_slow: latest("ema_slow", &self.ema_slow)?,
            sma_long: latest("sma_long", &self.sma_long)?,
            macd_hist: latest("macd_hist", &self.macd.histogram)?,
            rsi_slow: latest("rsi_slow", &self.rsi_slow)?,
            rsi_fast: latest("rsi_fast", &self.rsi_fast)?,
            stoch_k: latest("stoch_k", &self.stochastic.k)?,
            stoch_d: latest("stoch_d", &self.stochastic.d)?,
            williams_r: latest("williams_r", &self.williams_r)?,
            atr: latest("atr", &self.atr)?,
            atr_average: latest("atr_average", &self.atr_average)?,
            bb_upper: latest("bb_upper", &self.bollinger.upper)?,
            bb_middle: latest("bb_middle", &self.bollinger.middle)?,
            bb_lower: latest("bb_lower", &self.bollinger.lower)?,
        })
    }
}

/// Latest readings, all finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub sma_long: f64,
    pub macd_hist: f64,
    pub rsi_slow: f64,
    pub rsi_fast: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub williams_r: f64,
    pub atr: f64,
    pub atr_average: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
}
