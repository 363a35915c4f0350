use serde_json::json;
use tiny_http::{Header, Request, Response};

use super::upstream::dispatch::RouteError;

/// Structured client-facing error body. Terminal failures name their class
/// and how many models were attempted; raw upstream errors are reduced to a
/// one-line detail string.
pub(super) fn error_body(
    error_type: &str,
    message: &str,
    models_attempted: Option<usize>,
) -> Vec<u8> {
    let mut error = json!({
        "type": error_type,
        "message": message,
    });
    if let Some(attempted) = models_attempted {
        error["models_attempted"] = json!(attempted);
    }
    json!({ "error": error }).to_string().into_bytes()
}

pub(super) fn respond_error(
    request: Request,
    status_code: u16,
    error_type: &str,
    message: &str,
    models_attempted: Option<usize>,
) {
    let body = error_body(error_type, message, models_attempted);
    let len = Some(body.len());
    let mut headers = Vec::new();
    if let Ok(header) = Header::from_bytes(b"Content-Type".as_slice(), b"application/json".as_slice()) {
        headers.push(header);
    }
    let response = Response::new(
        tiny_http::StatusCode(status_code),
        headers,
        std::io::Cursor::new(body),
        len,
        None,
    );
    let _ = request.respond(response);
}

pub(super) fn respond_route_error(request: Request, error: RouteError) {
    match error {
        RouteError::NoAvailableModels => respond_error(
            request,
            503,
            "no_available_models",
            "no candidate model is currently available",
            Some(0),
        ),
        RouteError::Exhausted {
            models_attempted,
            last_error,
        } => respond_error(
            request,
            502,
            "request_exhausted",
            &format!("all candidate models failed; last error: {last_error}"),
            Some(models_attempted),
        ),
        RouteError::DeadlineExceeded {
            models_attempted,
            last_error,
        } => {
            let message = match last_error {
                Some(detail) => format!("request deadline exceeded; last error: {detail}"),
                None => "request deadline exceeded".to_string(),
            };
            respond_error(
                request,
                504,
                "deadline_exceeded",
                &message,
                Some(models_attempted),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_names_class_and_attempt_count() {
        let body = error_body("request_exhausted", "all candidate models failed", Some(3));
        let value: serde_json::Value = serde_json::from_slice(&body).expect("valid json");
        assert_eq!(value["error"]["type"], "request_exhausted");
        assert_eq!(value["error"]["models_attempted"], 3);
    }

    #[test]
    fn error_body_omits_attempt_count_when_unknown() {
        let body = error_body("not_found", "endpoint not found", None);
        let value: serde_json::Value = serde_json::from_slice(&body).expect("valid json");
        assert!(value["error"].get("models_attempted").is_none());
    }
}
