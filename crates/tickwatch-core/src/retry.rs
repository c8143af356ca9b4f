//! Fixed-delay retry policy for exchange requests.

use std::time::Duration;

/// How many times a failed request is re-issued and how long to wait between
/// attempts. Total attempts = `max_retries + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1), 3)
    }
}

impl RetryPolicy {
    pub const fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self { max_retries, delay }
    }

    /// Single attempt, no retries.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    pub const fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Transport errors flagged retryable and 5xx responses are retried;
    /// 4xx responses never are.
    pub const fn should_retry_status(&self, status: u16) -> bool {
        status >= 500
    }

    /// The delay does not grow with the attempt number.
    pub const fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        self.delay
    }
}
