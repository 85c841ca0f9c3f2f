// src/queue/backoff.rs
// Exponential retry backoff with full jitter

use chrono::Utc;
use rand::Rng;
use std::time::Duration;

/// Exponent cap; beyond this the delay is saturated at `cap` anyway and
/// shifting further would overflow.
const MAX_EXPONENT: u32 = 16;

/// Retry delay schedule: `base * 2^(attempt-1)` capped at `cap`, then
/// jittered into [0.5, 1.0] of the computed delay so a burst of failures
/// doesn't retry in lockstep.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
        }
    }

    pub fn from_millis(base_ms: u64, cap_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(cap_ms),
        )
    }

    /// Jittered delay before the given attempt (1-based count of attempts
    /// already consumed) may run again.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        let raw = self.base.saturating_mul(1u32 << exponent).min(self.cap);
        let factor: f64 = rand::rng().random_range(0.5..=1.0);
        raw.mul_f64(factor)
    }

    /// Earliest re-dispatch instant for the given attempt, formatted as a
    /// SQLite-comparable UTC datetime.
    pub fn next_attempt_at(&self, attempt: u32) -> String {
        let delay = self.delay_for_attempt(attempt);
        let at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_millis(2_000, 900_000)
    }
}
