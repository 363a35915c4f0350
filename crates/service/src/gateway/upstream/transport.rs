use std::time::{Duration, Instant};

/// Attribution headers the upstream uses to identify proxy traffic; same
/// values on every attempt.
const REFERER_HEADER_VALUE: &str = "https://github.com/tcsenpai/openrouter-free-scanner";
const TITLE_HEADER_VALUE: &str = "OpenRouter Free Proxy";

/// Sends one chat-completion attempt upstream. The bearer is the client's
/// own key, forwarded verbatim. On a connection-level error the send is
/// retried once on a fresh client before the error is reported; the pooled
/// singleton can be stuck on a dead network path after a proxy change.
pub(super) fn send_chat_completion(
    client: &reqwest::blocking::Client,
    url: &str,
    body: &[u8],
    bearer: &str,
    attempt_timeout: Duration,
    deadline: Option<Instant>,
) -> Result<reqwest::blocking::Response, reqwest::Error> {
    let timeout = super::deadline::send_timeout(attempt_timeout, deadline);
    let build_request = |http: &reqwest::blocking::Client| {
        http.post(url)
            .timeout(timeout)
            .header("Authorization", format!("Bearer {bearer}"))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", REFERER_HEADER_VALUE)
            .header("X-Title", TITLE_HEADER_VALUE)
            .body(body.to_vec())
    };

    match build_request(client).send() {
        Ok(response) => Ok(response),
        Err(first_err) => {
            let fresh = super::super::fresh_upstream_client();
            match build_request(&fresh).send() {
                Ok(response) => Ok(response),
                Err(_) => Err(first_err),
            }
        }
    }
}
