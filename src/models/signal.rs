//! Output of the signal scorer.

use serde::{Deserialize, Serialize};

use super::TradeSide;

/// Directional decision for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignalDecision {
    Buy,
    Sell,
    /// No directional decision
    #[default]
    Neutral,
}

impl SignalDecision {
    pub fn trade_side(&self) -> Option<TradeSide> {
        match self {
            SignalDecision::Buy => Some(TradeSide::Buy),
            SignalDecision::Sell => Some(TradeSide::Sell),
            SignalDecision::Neutral => None,
        }
    }
}

/// Decision plus the scores behind it, kept for the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Signal {
    pub decision: SignalDecision,
    pub bullish: u32,
    pub bearish: u32,
    /// Why a neutral decision was forced, if it was
    pub veto: Option<String>,
}

impl Signal {
    /// Neutral decision forced before any scoring happened.
    pub fn vetoed(reason: impl Into<String>) -> Self {
        Self {
            decision: SignalDecision::Neutral,
            bullish: 0,
            bearish: 0,
            veto: Some(reason.into()),
        }
    }
}
