//! Retry policy: exponential backoff with a capped delay.

use std::time::Duration;

/// `max_retries`/`initial_backoff_ms`/`max_backoff_ms` from [`fga_proto::FgaConfig`],
/// carried here so the client doesn't need to depend on the config type directly.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
        }
    }

    /// Backoff before the given retry attempt (1-indexed: the delay before
    /// the first retry, not the initial call). Doubles each attempt, capped
    /// at `max_backoff`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        debug_assert!(attempt >= 1, "attempt 0 is the initial call, it has no backoff");
        let shift = attempt.saturating_sub(1).min(31);
        let scaled = self.initial_backoff.as_millis().saturating_mul(1u128 << shift);
        let capped = scaled.min(self.max_backoff.as_millis());
        Duration::from_millis(capped as u64)
    }

    /// Total attempts including the initial call.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}
