//! Error taxonomy for terminal calls and trading decisions.

use thiserror::Error;

/// Failure returned by a call through the market/execution capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The terminal itself cannot be reached.
    #[error("terminal unreachable: {0}")]
    Unreachable(String),

    /// The call succeeded but returned no usable data (no bars, zero quote).
    #[error("data unavailable: {0}")]
    Unavailable(String),

    /// Price moved between quote and submission.
    #[error("requote: {0}")]
    Requote(String),

    /// Broker refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Network hiccup or timeout worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl GatewayError {
    /// Whether the call may succeed if repeated shortly.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_) | GatewayError::Requote(_))
    }
}

/// Failure of a trading step, classified by how the control loop reacts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeError {
    /// Terminal unreachable: back off, reconnect, resume.
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    /// Bars or quote missing: skip this tick.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Lot or volume outside broker bounds: abort the attempt, no retry.
    #[error("validation failure: {0}")]
    Validation(String),

    /// Broker rejection after retries: warn and defer to the next tick.
    #[error("execution rejected: {0}")]
    ExecutionRejected(String),

    /// Warm-up history too short or a NaN reading: no signal this tick.
    #[error("indicator unavailable: {0}")]
    IndicatorUnavailable(String),
}

impl TradeError {
    /// Only lost connectivity ends the current run of the loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TradeError::Connectivity(_))
    }
}

impl From<GatewayError> for TradeError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unreachable(msg) => TradeError::Connectivity(msg),
            GatewayError::Unavailable(msg) => TradeError::DataUnavailable(msg),
            GatewayError::Requote(msg)
            | GatewayError::Rejected(msg)
            | GatewayError::Transient(msg) => TradeError::ExecutionRejected(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_classification() {
        assert!(GatewayError::Requote("10004".into()).is_transient());
        assert!(GatewayError::Transient("timeout".into()).is_transient());
        assert!(!GatewayError::Rejected("no money".into()).is_transient());
        assert!(!GatewayError::Unreachable("refused".into()).is_transient());
    }

    #[test]
    fn test_only_connectivity_is_fatal() {
        let fatal: TradeError = GatewayError::Unreachable("down".into()).into();
        assert!(fatal.is_fatal());

        let skipped: TradeError = GatewayError::Unavailable("no bars".into()).into();
        assert_eq!(skipped, TradeError::DataUnavailable("no bars".into()));
        assert!(!skipped.is_fatal());
        assert!(!TradeError::Validation("lot".into()).is_fatal());
    }
}
