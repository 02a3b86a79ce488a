//! Retry logic with exponential backoff and jitter
//!
//! [`RetryStrategy`] repeatedly runs a single-attempt operation under a
//! [`RetryConfig`]. Failures are classified by kind: only transient errors
//! (connection failures, timeouts, 5xx) are retried.

use medq_core::{Result, RetryConfig, ToolError};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Relative spread applied to a delay when jitter is enabled
pub const JITTER_RATIO: f64 = 0.2;

/// Executes operations under a retry policy
#[derive(Debug, Clone, Default)]
pub struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retry `retry` (1-based), jitter included
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let delay = self.config.nominal_delay(retry);

        if self.config.jitter() {
            apply_jitter(delay)
        } else {
            delay
        }
    }

    /// Delay to wait after `error` ended attempt `retry`
    ///
    /// A `Retry-After` hint carried by the error wins over the computed
    /// backoff and is clamped to `max_delay`.
    pub fn delay_after(&self, error: &ToolError, retry: u32) -> Duration {
        match error.retry_after() {
            Some(hint) => hint.min(self.config.max_delay()),
            None => self.backoff_delay(retry),
        }
    }

    /// Execute an async operation with retry logic
    ///
    /// # Arguments
    ///
    /// * `operation_name` - Name of the operation (for logging)
    /// * `operation` - Single-attempt async operation
    ///
    /// # Returns
    ///
    /// The first successful result, or the error of the final attempt,
    /// unmodified.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                "Attempt {}/{} for operation: {}",
                attempt, max_attempts, operation_name
            );

            let error = match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(
                            "Operation '{}' succeeded after {} retries",
                            operation_name,
                            attempt - 1
                        );
                    }
                    return Ok(result);
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                debug!(
                    "Operation '{}' failed with non-retryable error: {}",
                    operation_name, error
                );
                return Err(error);
            }

            if attempt >= max_attempts {
                warn!(
                    "Operation '{}' failed after {} attempts: {}",
                    operation_name, attempt, error
                );
                return Err(error);
            }

            let delay = self.delay_after(&error, attempt);
            warn!(
                "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                operation_name, attempt, max_attempts, error, delay
            );
            sleep(delay).await;
        }
    }
}

/// Scale `delay` by a uniform factor in `[1 - JITTER_RATIO, 1 + JITTER_RATIO]`
fn apply_jitter(delay: Duration) -> Duration {
    let factor = 1.0 + (fastrand::f64() * 2.0 - 1.0) * JITTER_RATIO;
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor.max(0.0)).unwrap_or(delay)
}
