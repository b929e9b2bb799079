//! Retry policy for failed jobs.

use std::time::Duration;
use taskmesh_core::MAX_RETRIES;

/// Exponential backoff policy: the k-th failure delays re-enqueue by
/// `base_delay * 2^k`, and the budget is exhausted strictly past
/// `max_retries`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: i32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom base delay; used to shrink waits in tests.
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Self::default()
        }
    }

    /// True when the observed retry count has crossed the budget, i.e. the
    /// dead-letter edge must be taken.
    pub fn is_exhausted(&self, retry_count: i32) -> bool {
        retry_count > self.max_retries
    }

    /// Backoff delay for the given (1-based) failure count.
    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        if attempt <= 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << attempt.clamp(0, 30) as u32;
        self.base_delay.saturating_mul(factor)
    }
}
