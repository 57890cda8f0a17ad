//! Retry policy with exponential backoff
//!
//! Applies only to network-level failures (no response received). Failures
//! that carry an HTTP response are never retried by this policy.

use std::time::Duration;

use crate::config::RetryConfig;

/// Exponential backoff retry policy
///
/// Attempt numbers are zero-indexed: `delay_for(0)` is the delay before the
/// first retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy from configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self { max_retries: config.max_retries, base_delay: config.base_delay }
    }

    /// Whether another retry is allowed after the given number of retries
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Backoff delay before retry number `attempt`: `base_delay * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
