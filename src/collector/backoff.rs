// Bounded exponential backoff around a single remote call

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::config::BackoffPolicy;
use super::errors::CollectError;

pub struct BackoffExecutor {
    policy: BackoffPolicy,
}

impl BackoffExecutor {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Nominal wait after the failed attempt number `attempt` (0-based):
    /// `min(max_delay, initial_delay * 2^attempt)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.policy
            .initial_delay
            .saturating_mul(factor)
            .min(self.policy.max_delay)
    }

    fn wait_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.policy.jitter {
            delay.mul_f64(0.5 + 0.5 * fastrand::f64())
        } else {
            delay
        }
    }

    /// Run `operation`, retrying retryable failures up to `max_attempts` times.
    ///
    /// Non-retryable errors are returned as-is without waiting. Running out of
    /// attempts yields `MaxRetriesExceeded` carrying the last error text.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, CollectError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollectError>>,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(label = %label, attempt = attempt + 1, "request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    last_error = e.to_string();
                    if attempt + 1 == attempts {
                        break;
                    }
                    let wait = self.wait_for(attempt);
                    warn!(
                        label = %label,
                        attempt = attempt + 1,
                        delay_secs = wait.as_secs_f64(),
                        error = %e,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(CollectError::MaxRetriesExceeded {
            attempts,
            last_error,
        })
    }
}

impl Default for BackoffExecutor {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
