//! Bounded retry around terminal calls.
//!
//! Transient failures are retried with a fixed delay up to `max_attempts`
//! total calls. A requote gets one immediate retry on top of that; a second
//! requote is final. Everything else fails on the first attempt.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::backoff::Backoff;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GatewayError;

/// Retry settings for execution and data calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total calls, first attempt included
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Fixed delay, bounded number of retries.
#[derive(Debug, Clone)]
struct FixedBackoff {
    delay: Duration,
    retries_left: u32,
    max_retries: u32,
}

impl FixedBackoff {
    fn new(policy: &RetryPolicy) -> Self {
        let max_retries = policy.max_attempts.saturating_sub(1);
        Self {
            delay: policy.delay(),
            retries_left: max_retries,
            max_retries,
        }
    }
}

impl Backoff for FixedBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries_left == 0 {
            return None;
        }
        self.retries_left -= 1;
        Some(self.delay)
    }

    fn reset(&mut self) {
        self.retries_left = self.max_retries;
    }
}

/// Run `op` under `policy`, logging every retry against `operation`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let requotes = AtomicU32::new(0);
    let requotes = &requotes;

    backoff::future::retry_notify(
        FixedBackoff::new(policy),
        || {
            let call = op();
            async move {
                match call.await {
                    Ok(value) => Ok(value),
                    Err(e @ GatewayError::Requote(_)) => {
                        if requotes.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(backoff::Error::retry_after(e, Duration::ZERO))
                        } else {
                            Err(backoff::Error::permanent(e))
                        }
                    }
                    Err(e) if e.is_transient() => Err(backoff::Error::transient(e)),
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        },
        |err: GatewayError, wait: Duration| {
            warn!(
                operation = operation,
                error = %err,
                wait_ms = wait.as_millis() as u64,
                "Retrying terminal call"
            );
        },
    )
    .await
}
