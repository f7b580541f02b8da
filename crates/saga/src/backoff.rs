//! Exponential backoff between dispatch rounds.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Retry *k* waits `base · 2^k`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry `retry` (0 for the first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        // 2^31 already exceeds any sane ceiling.
        let factor = 1u32.checked_shl(retry.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// When a saga with `attempts` rounds so far, the last at
    /// `last_attempt_at`, may be touched again.
    pub fn retry_at(&self, attempts: u32, last_attempt_at: DateTime<Utc>) -> DateTime<Utc> {
        let delay = self.delay(attempts.saturating_sub(1));
        chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| last_attempt_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
