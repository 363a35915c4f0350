use std::time::Instant;

use serde_json::{json, Value};

use super::super::GatewayState;
use super::outcome::{self, AttemptClass};
use super::{deadline, transport};

/// Terminal routing failures; everything retryable stays internal to the
/// route loop and is never surfaced per-attempt.
#[derive(Debug)]
pub(in super::super) enum RouteError {
    /// The try-list was empty at the first SELECTING pass.
    NoAvailableModels,
    /// Every viable candidate was tried and failed.
    Exhausted {
        models_attempted: usize,
        last_error: String,
    },
    /// The end-to-end deadline elapsed before a candidate succeeded.
    DeadlineExceeded {
        models_attempted: usize,
        last_error: Option<String>,
    },
}

pub(in super::super) enum RoutedResponse {
    /// 2xx JSON, fully read and validated before the success was recorded.
    Buffered {
        status: u16,
        headers: Vec<(String, String)>,
        body: bytes::Bytes,
    },
    /// 2xx SSE, handed off for incremental forwarding.
    Streaming {
        model_id: String,
        response: reqwest::blocking::Response,
    },
}

fn snapshot_headers(response: &reqwest::blocking::Response) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// Routes one inbound chat-completion payload across the candidate list.
///
/// The loop is the request state machine: each iteration is a SELECTING pass
/// (availability re-read, order preserved), the inner loop is DISPATCHING
/// with the same-model retry budget, and leaving the inner loop without a
/// response is FAILING_OVER (the candidate has been removed from the
/// try-list). The client-supplied model id is always overridden with the
/// selected candidate.
pub(in super::super) fn route_chat_completion(
    state: &GatewayState,
    payload: &Value,
    bearer: &str,
) -> Result<RoutedResponse, RouteError> {
    let config = &state.config;
    let started_at = Instant::now();
    let request_deadline = deadline::request_deadline(started_at, config.total_timeout);
    let url = config.chat_completions_url();
    let client = super::super::upstream_client();

    let candidates = state.catalog.current();
    let mut remaining: Vec<_> = candidates.iter().cloned().collect();
    let requested_model = payload
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("unspecified");

    let mut models_attempted = 0usize;
    let mut last_error: Option<String> = None;

    loop {
        if deadline::is_expired(request_deadline) {
            return Err(RouteError::DeadlineExceeded {
                models_attempted,
                last_error,
            });
        }
        let Some(idx) = super::super::selection::next_available(&remaining, &state.health) else {
            if models_attempted == 0 {
                return Err(RouteError::NoAvailableModels);
            }
            return Err(RouteError::Exhausted {
                models_attempted,
                last_error: last_error.unwrap_or_else(|| "no further candidates".to_string()),
            });
        };
        let model = remaining.remove(idx);
        models_attempted += 1;

        let mut attempt_payload = payload.clone();
        attempt_payload["model"] = json!(model.id.clone());
        let body = match serde_json::to_vec(&attempt_payload) {
            Ok(body) => body,
            Err(err) => {
                // Re-serialization of a parsed object cannot realistically
                // fail; treat it as exhaustion rather than panic.
                return Err(RouteError::Exhausted {
                    models_attempted,
                    last_error: format!("request re-encode failed: {err}"),
                });
            }
        };
        log::info!(
            "routing request (client model: {requested_model}) to: {}",
            model.id
        );

        let mut same_model_attempt: u32 = 0;
        loop {
            if deadline::is_expired(request_deadline) {
                return Err(RouteError::DeadlineExceeded {
                    models_attempted,
                    last_error,
                });
            }
            let send_result = transport::send_chat_completion(
                client,
                &url,
                &body,
                bearer,
                config.attempt_timeout,
                request_deadline,
            );
            let response = match send_result {
                Ok(response) => response,
                Err(err) => {
                    state.health.record_failure(&model.id);
                    last_error = Some(format!("{}: {err}", model.id));
                    if same_model_attempt < config.same_model_retries {
                        same_model_attempt += 1;
                        if !config.backoff.sleep_before_retry(same_model_attempt, request_deadline) {
                            return Err(RouteError::DeadlineExceeded {
                                models_attempted,
                                last_error,
                            });
                        }
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            match outcome::classify_status(status) {
                AttemptClass::Success => {
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string);
                    if outcome::is_event_stream_content_type(content_type.as_deref()) {
                        state.health.record_success(&model.id);
                        return Ok(RoutedResponse::Streaming {
                            model_id: model.id.clone(),
                            response,
                        });
                    }
                    if outcome::is_html_content_type(content_type.as_deref()) {
                        // Challenge page behind a 200; this model's path is
                        // broken and retrying it cannot help.
                        state.health.record_failure(&model.id);
                        last_error = Some(format!("{}: upstream returned text/html", model.id));
                        break;
                    }
                    let headers = snapshot_headers(&response);
                    let status_code = status.as_u16();
                    match response.bytes() {
                        Ok(bytes) => {
                            if serde_json::from_slice::<Value>(bytes.as_ref()).is_ok() {
                                state.health.record_success(&model.id);
                                return Ok(RoutedResponse::Buffered {
                                    status: status_code,
                                    headers,
                                    body: bytes,
                                });
                            }
                            state.health.record_failure(&model.id);
                            last_error = Some(format!("{}: malformed upstream body", model.id));
                            break;
                        }
                        Err(err) => {
                            state.health.record_failure(&model.id);
                            last_error = Some(format!("{}: body read failed: {err}", model.id));
                            if same_model_attempt < config.same_model_retries {
                                same_model_attempt += 1;
                                if !config
                                    .backoff
                                    .sleep_before_retry(same_model_attempt, request_deadline)
                                {
                                    return Err(RouteError::DeadlineExceeded {
                                        models_attempted,
                                        last_error,
                                    });
                                }
                                continue;
                            }
                            break;
                        }
                    }
                }
                AttemptClass::Transient => {
                    state.health.record_failure(&model.id);
                    last_error = Some(format!("{}: upstream status {}", model.id, status.as_u16()));
                    if same_model_attempt < config.same_model_retries {
                        same_model_attempt += 1;
                        if !config.backoff.sleep_before_retry(same_model_attempt, request_deadline) {
                            return Err(RouteError::DeadlineExceeded {
                                models_attempted,
                                last_error,
                            });
                        }
                        continue;
                    }
                    break;
                }
                AttemptClass::Fatal => {
                    state.health.record_failure(&model.id);
                    last_error = Some(format!("{}: upstream status {}", model.id, status.as_u16()));
                    break;
                }
            }
        }
        log::warn!(
            "failing over from {}: {}",
            model.id,
            last_error.as_deref().unwrap_or("unknown error")
        );
    }
}
