use reqwest::StatusCode;

/// Classification of one upstream attempt. Decides RETRYING (same model)
/// versus FAILING_OVER (next candidate); never surfaced per-attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AttemptClass {
    /// 2xx; body well-formedness is checked separately by the dispatcher.
    Success,
    /// Worth retrying the same model: rate limit or an upstream-side fault.
    Transient,
    /// Retrying the same model cannot help; fail over immediately.
    Fatal,
}

pub(super) fn classify_status(status: StatusCode) -> AttemptClass {
    match status.as_u16() {
        200..=299 => AttemptClass::Success,
        429 => AttemptClass::Transient,
        500..=599 => AttemptClass::Transient,
        _ => AttemptClass::Fatal,
    }
}

/// A 2xx response whose body is not JSON (typically an HTML challenge page)
/// is treated as malformed: non-retryable on this model.
pub(super) fn is_html_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|value| value.to_ascii_lowercase())
        .is_some_and(|value| value.starts_with("text/html"))
}

pub(super) fn is_event_stream_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|value| value.to_ascii_lowercase())
        .is_some_and(|value| value.starts_with("text/event-stream"))
}
