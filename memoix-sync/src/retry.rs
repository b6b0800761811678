//! Bounded retry with exponential backoff.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How many times a remote call is attempted and how long to wait between
/// attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for every later one.
    pub base_delay: Duration,
    /// Upper bound for a single attempt. `None` disables the bound.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            attempt_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no delay, no timeout.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            attempt_timeout: None,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Runs `f` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted. The last error is returned unchanged.
pub async fn with_retry<T, F, Fut>(operation: &str, policy: &RetryPolicy, mut f: F) -> SyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, f()).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout),
            },
            None => f().await,
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    warn!(operation, attempts = attempt, error = %err, "Giving up");
                } else {
                    debug!(operation, error = %err, "Not retrying");
                }
                return Err(err);
            }
        }
    }
}
