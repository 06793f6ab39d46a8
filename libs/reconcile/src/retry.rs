//! Fixed-delay retry policy for migration steps.

use std::time::Duration;

use crate::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};

/// Bounded attempts separated by a constant delay.
///
/// `max_attempts` counts the first try, so a policy of 3 makes at most three
/// calls. The caller decides which failures are retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. Zero attempts is clamped to one.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether another attempt should follow a failed `attempt` (1-based).
    pub fn should_retry(&self, attempt: u32, retryable: bool) -> bool {
        retryable && attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}
