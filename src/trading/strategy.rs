//! Signal scoring: turns indicator readings into a bounded directional decision.
//!
//! Two sub-scores are summed:
//! - Trend alignment (EMA crossover, price vs long SMA, MACD histogram sign)
//! - Momentum oscillators (RSI, fast RSI, stochastic, Williams %R)
//!
//! A volatility gate runs first and can veto any decision.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::{IndicatorParams, IndicatorSet, IndicatorSnapshot};
use crate::models::{BarSeries, Signal, SignalDecision};

/// Signal scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Lookback periods
    pub indicators: IndicatorParams,

    /// Bars required before any directional decision
    pub min_bars: usize,

    /// Votes one side needs to act (out of 7)
    pub min_signals: u32,

    // === Volatility gate ===
    /// ATR below this vetoes trading (low liquidity)
    pub min_atr: f64,

    /// ATR above its average x this vetoes trading (news spike)
    pub atr_spike_factor: f64,

    // === Momentum thresholds ===
    /// Slow RSI is only scored strictly inside (oversold, overbought)
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub rsi_bullish: f64,
    pub rsi_bearish: f64,
    pub rsi_fast_bullish: f64,
    pub rsi_fast_bearish: f64,
    /// Stochastic %K confirmation line
    pub stoch_midline: f64,
    pub williams_midline: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            indicators: IndicatorParams::default(),
            min_bars: 100,
            min_signals: 4,
            min_atr: 0.0008,
            atr_spike_factor: 2.0,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            rsi_bullish: 55.0,
            rsi_bearish: 45.0,
            rsi_fast_bullish: 60.0,
            rsi_fast_bearish: 40.0,
            stoch_midline: 50.0,
            williams_midline: -50.0,
        }
    }
}

/// Bullish and bearish vote counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    pub bullish: u32,
    pub bearish: u32,
}

impl Score {
    fn vote(&mut self, bullish: bool, bearish: bool) {
        if bullish {
            self.bullish += 1;
        } else if bearish {
            self.bearish += 1;
        }
    }
}

impl std::ops::Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        Score {
            bullish: self.bullish + rhs.bullish,
            bearish: self.bearish + rhs.bearish,
        }
    }
}

/// Signal scorer.
pub struct Strategy {
    config: StrategyConfig,
}

impl Strategy {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    pub fn default_strategy() -> Self {
        Self::new(StrategyConfig::default())
    }

    /// Compute indicators for `bars` using the configured periods.
    pub fn indicators(&self, bars: &BarSeries) -> IndicatorSet {
        IndicatorSet::compute(bars, &self.config.indicators)
    }

    /// Evaluate a bar window end to end.
    pub fn evaluate(&self, bars: &BarSeries) -> Signal {
        if bars.len() < self.config.min_bars {
            return Signal::vetoed(format!(
                "insufficient history: {} < {} bars",
                bars.len(),
                self.config.min_bars
            ));
        }
        self.evaluate_indicators(bars.len(), &self.indicators(bars))
    }

    /// Evaluate precomputed indicators for a window of `bar_count` bars.
    pub fn evaluate_indicators(&self, bar_count: usize, indicators: &IndicatorSet) -> Signal {
        if bar_count < self.config.min_bars {
            return Signal::vetoed(format!(
                "insufficient history: {} < {} bars",
                bar_count, self.config.min_bars
            ));
        }
        match indicators.snapshot() {
            Ok(snapshot) => self.score(&snapshot),
            Err(e) => Signal::vetoed(e.to_string()),
        }
    }

    /// Score a snapshot. The volatility gate is checked before any vote.
    pub fn score(&self, snap: &IndicatorSnapshot) -> Signal {
        if let Some(reason) = self.volatility_veto(snap) {
            debug!(atr = snap.atr, atr_average = snap.atr_average, reason = %reason, "Signal vetoed");
            return Signal::vetoed(reason);
        }

        let score = self.trend_score(snap) + self.momentum_score(snap);
        let decision = self.decide(score);

        debug!(
            bullish = score.bullish,
            bearish = score.bearish,
            decision = ?decision,
            "Signal scored"
        );

        Signal {
            decision,
            bullish: score.bullish,
            bearish: score.bearish,
            veto: None,
        }
    }

    fn volatility_veto(&self, snap: &IndicatorSnapshot) -> Option<String> {
        if snap.atr < self.config.min_atr {
            return Some(format!(
                "ATR {:.5} below floor {:.5}",
                snap.atr, self.config.min_atr
            ));
        }
        if snap.atr > snap.atr_average * self.config.atr_spike_factor {
            return Some(format!(
                "ATR {:.5} above {}x its average {:.5}",
                snap.atr, self.config.atr_spike_factor, snap.atr_average
            ));
        }
        None
    }

    /// EMA crossover, close vs long SMA, MACD histogram sign.
    pub fn trend_score(&self, snap: &IndicatorSnapshot) -> Score {
        let mut score = Score::default();
        score.vote(snap.ema_fast > snap.ema_slow, snap.ema_fast < snap.ema_slow);
        score.vote(snap.close > snap.sma_long, snap.close < snap.sma_long);
        score.vote(snap.macd_hist > 0.0, snap.macd_hist < 0.0);
        score
    }

    /// RSI inside its non-extreme band, fast RSI, stochastic with midline
    /// confirmation, Williams %R vs its midline.
    pub fn momentum_score(&self, snap: &IndicatorSnapshot) -> Score {
        let c = &self.config;
        let mut score = Score::default();

        let rsi_in_band = snap.rsi_slow > c.rsi_oversold && snap.rsi_slow < c.rsi_overbought;
        score.vote(
            rsi_in_band && snap.rsi_slow > c.rsi_bullish,
            rsi_in_band && snap.rsi_slow < c.rsi_bearish,
        );
        score.vote(
            snap.rsi_fast > c.rsi_fast_bullish,
            snap.rsi_fast < c.rsi_fast_bearish,
        );
        score.vote(
            snap.stoch_k > snap.stoch_d && snap.stoch_k > c.stoch_midline,
            snap.stoch_k < snap.stoch_d && snap.stoch_k < c.stoch_midline,
        );
        score.vote(
            snap.williams_r > c.williams_midline,
            snap.williams_r < c.williams_midline,
        );
        score
    }

    /// Buy iff B >= threshold and B > S, Sell iff S >= threshold and S > B.
    /// A tie never produces a direction.
    pub fn decide(&self, score: Score) -> SignalDecision {
        let threshold = self.config.min_signals;
        if score.bullish >= threshold && score.bullish > score.bearish {
            SignalDecision::Buy
        } else if score.bearish >= threshold && score.bearish > score.bullish {
            SignalDecision::Sell
        } else {
            SignalDecision::Neutral
        }
    }
}
