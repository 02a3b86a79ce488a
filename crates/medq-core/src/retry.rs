//! Retry policy configuration
//!
//! A [`RetryConfig`] is validated when it is built and cannot be changed
//! afterwards, so invalid policies surface at configuration time rather than
//! in the middle of a call.

use crate::error::{Result, ToolError};
use serde::Serialize;
use std::time::Duration;

/// Policy for one class of calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryConfig {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
    exponential_base: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
            exponential_base: 2,
        }
    }
}

impl RetryConfig {
    /// Create a validated retry policy
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter: bool,
        exponential_base: u32,
    ) -> Result<Self> {
        let config = Self {
            max_retries,
            base_delay,
            max_delay,
            jitter,
            exponential_base,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a new configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() {
            return Err(ToolError::Config(
                "base_delay must be greater than zero".to_string(),
            ));
        }

        if self.max_delay < self.base_delay {
            return Err(ToolError::Config(format!(
                "max_delay ({:?}) must not be shorter than base_delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }

        if self.exponential_base < 2 {
            return Err(ToolError::Config(format!(
                "exponential_base must be at least 2, got {}",
                self.exponential_base
            )));
        }

        Ok(())
    }

    /// Number of retries after the first attempt
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total number of attempts, first one included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    pub fn exponential_base(&self) -> u32 {
        self.exponential_base
    }

    /// Delay before retry `retry` (1-based), before jitter is applied
    ///
    /// `min(max_delay, base_delay * exponential_base^(retry - 1))`. Overflow
    /// saturates to `max_delay`.
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        self.exponential_base
            .checked_pow(retry - 1)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Builder for RetryConfig
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    max_retries: Option<u32>,
    base_delay: Option<Duration>,
    max_delay: Option<Duration>,
    jitter: Option<bool>,
    exponential_base: Option<u32>,
}

impl RetryConfigBuilder {
    /// Set the number of retries after the first attempt
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the delay before the first retry
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Set the upper bound on any single delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Enable or disable jitter
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Set the exponential growth factor
    pub fn exponential_base(mut self, base: u32) -> Self {
        self.exponential_base = Some(base);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<RetryConfig> {
        let defaults = RetryConfig::default();

        RetryConfig::new(
            self.max_retries.unwrap_or(defaults.max_retries),
            self.base_delay.unwrap_or(defaults.base_delay),
            self.max_delay.unwrap_or(defaults.max_delay),
            self.jitter.unwrap_or(defaults.jitter),
            self.exponential_base.unwrap_or(defaults.exponential_base),
        )
    }
}
