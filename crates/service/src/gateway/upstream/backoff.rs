use rand::Rng;
use std::time::{Duration, Instant};

/// Exponential backoff with full jitter for same-model retries. The drawn
/// delay doubles its ceiling per attempt and never exceeds `cap`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

fn as_millis_u64(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

impl BackoffPolicy {
    pub(crate) fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub(super) fn delay(&self, attempt: u32) -> Duration {
        let base_ms = as_millis_u64(self.base);
        let cap_ms = as_millis_u64(self.cap);
        if base_ms == 0 || cap_ms == 0 {
            return Duration::from_millis(0);
        }
        let multiplier = 1_u64 << attempt.min(10);
        let ceiling_ms = base_ms.saturating_mul(multiplier).min(cap_ms).max(1);
        let jitter_ms = rand::thread_rng().gen_range(0..=ceiling_ms);
        Duration::from_millis(jitter_ms)
    }

    /// Sleeps out the drawn delay, bounded by the request deadline. Returns
    /// false without sleeping when the deadline has already elapsed, so an
    /// expiring request terminates instead of waiting out the backoff.
    pub(super) fn sleep_before_retry(&self, attempt: u32, deadline: Option<Instant>) -> bool {
        let delay = self.delay(attempt);
        let Some(delay) = super::deadline::cap_wait(delay, deadline) else {
            return false;
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        true
    }
}
