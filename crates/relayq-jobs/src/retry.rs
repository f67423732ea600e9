//! Retry backoff for failed jobs.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with uniform jitter.
///
/// For attempt `k` the delay is `base * 2^k` plus a random amount in
/// `[0, base)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay before the next execution, given the attempt count after the
    /// failure was recorded.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = base_ms.saturating_mul(factor);

        let jitter = if base_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..base_ms)
        };

        Duration::from_millis(delay.saturating_add(jitter))
    }

    /// Unix-seconds release time for a retry scheduled at `now`.
    pub fn release_at(&self, now: i64, attempt: u32) -> i64 {
        let delay = i64::try_from(self.delay_for_attempt(attempt).as_secs()).unwrap_or(i64::MAX);
        now.saturating_add(delay)
    }
}

impl From<&relayq_config::QueueConfig> for RetryPolicy {
    fn from(config: &relayq_config::QueueConfig) -> Self {
        Self::new(config.retry_base())
    }
}
