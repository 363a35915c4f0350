use std::time::{Duration, Instant};

/// End-to-end deadline for one inbound request, bounding every dispatch,
/// same-model retry, and backoff sleep. `None` means unbounded.
pub(super) fn request_deadline(started_at: Instant, total_timeout: Option<Duration>) -> Option<Instant> {
    total_timeout.map(|timeout| started_at + timeout)
}

pub(super) fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
}

pub(super) fn is_expired(deadline: Option<Instant>) -> bool {
    remaining(deadline).is_some_and(|remaining| remaining.is_zero())
}

/// Caps a backoff wait to the time left; `None` means the deadline already
/// elapsed and the caller must give up instead of sleeping.
pub(super) fn cap_wait(wait: Duration, deadline: Option<Instant>) -> Option<Duration> {
    match remaining(deadline) {
        Some(remaining) if remaining.is_zero() => None,
        Some(remaining) => Some(wait.min(remaining)),
        None => Some(wait),
    }
}

/// Timeout for a single upstream send: the per-attempt limit, never past the
/// request deadline.
pub(super) fn send_timeout(attempt_timeout: Duration, deadline: Option<Instant>) -> Duration {
    match remaining(deadline) {
        Some(remaining) => attempt_timeout.min(remaining).max(Duration::from_millis(1)),
        None => attempt_timeout,
    }
}
