use std::io::Read;

use serde::Serialize;
use serde_json::{json, Value};
use tiny_http::{Header, Method, Request, Response};

use super::error_envelope::{respond_error, respond_route_error};
use super::http_bridge;
use super::upstream::dispatch::{route_chat_completion, RoutedResponse};
use super::GatewayState;

fn json_response(body: Vec<u8>) -> Response<std::io::Cursor<Vec<u8>>> {
    let len = Some(body.len());
    let mut headers = Vec::new();
    if let Ok(header) = Header::from_bytes(b"Content-Type".as_slice(), b"application/json".as_slice()) {
        headers.push(header);
    }
    Response::new(
        tiny_http::StatusCode(200),
        headers,
        std::io::Cursor::new(body),
        len,
        None,
    )
}

fn bearer_token(request: &Request) -> Option<String> {
    let raw = request
        .headers()
        .iter()
        .find(|header| header.field.equiv("Authorization"))
        .map(|header| header.value.as_str().to_string())?;
    let token = raw.strip_prefix("Bearer ").or_else(|| raw.strip_prefix("bearer "))?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

fn read_body_capped(request: &mut Request, cap: usize) -> Result<Vec<u8>, String> {
    let mut body = Vec::new();
    request
        .as_reader()
        .take(cap as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|err| format!("body read failed: {err}"))?;
    if body.len() > cap {
        return Err("request body too large".to_string());
    }
    Ok(body)
}

fn respond_model_list(request: Request, state: &GatewayState) {
    let now = chrono::Utc::now().timestamp();
    let candidates = state.catalog.current();
    let data: Vec<Value> = candidates
        .iter()
        .map(|model| {
            json!({
                "id": model.id,
                "object": "model",
                "created": now,
                "owned_by": "openrouter",
                "permission": [],
                "root": model.id,
                "parent": null,
            })
        })
        .collect();
    let body = json!({ "object": "list", "data": data }).to_string().into_bytes();
    let _ = request.respond(json_response(body));
}

#[derive(Serialize)]
struct HealthSummary {
    status: &'static str,
    models: usize,
    disabled_count: usize,
    disabled: Vec<String>,
}

fn respond_health(request: Request, state: &GatewayState) {
    let disabled = state.health.disabled_models();
    let summary = HealthSummary {
        status: "ok",
        models: state.catalog.current().len(),
        disabled_count: disabled.len(),
        disabled,
    };
    let body = serde_json::to_vec(&summary).unwrap_or_else(|_| b"{\"status\":\"ok\"}".to_vec());
    let _ = request.respond(json_response(body));
}

fn handle_chat_completion(mut request: Request, state: &GatewayState) {
    let Some(bearer) = bearer_token(&request) else {
        respond_error(
            request,
            401,
            "invalid_request",
            "missing or invalid Authorization header",
            None,
        );
        return;
    };
    let body = match read_body_capped(&mut request, super::max_request_body_bytes()) {
        Ok(body) => body,
        Err(err) => {
            let status = if err.contains("too large") { 413 } else { 400 };
            respond_error(request, status, "invalid_request", &err, None);
            return;
        }
    };
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => {
            respond_error(
                request,
                400,
                "invalid_request",
                "request body is not valid JSON",
                None,
            );
            return;
        }
    };
    if !payload.is_object() {
        respond_error(
            request,
            400,
            "invalid_request",
            "request body must be a JSON object",
            None,
        );
        return;
    }

    match route_chat_completion(state, &payload, &bearer) {
        Ok(RoutedResponse::Buffered {
            status,
            headers,
            body,
        }) => http_bridge::respond_buffered(request, status, &headers, body),
        Ok(RoutedResponse::Streaming { model_id, response }) => {
            log::info!("streaming response from: {model_id}");
            http_bridge::respond_streaming(request, response);
        }
        Err(error) => respond_route_error(request, error),
    }
}

fn handle_health_reset(request: Request, state: &GatewayState) {
    state.health.reset_all();
    log::info!("health state reset by administrative request");
    let body = json!({ "status": "ok" }).to_string().into_bytes();
    let _ = request.respond(json_response(body));
}

/// Routes one inbound request. Every path consumes the request with exactly
/// one respond call.
pub(crate) fn handle_gateway_request(request: Request, state: &GatewayState) {
    let path = request.url().split('?').next().unwrap_or("/").to_string();
    match (request.method().clone(), path.as_str()) {
        (Method::Get, "/v1/models") => respond_model_list(request, state),
        (Method::Get, "/health") => respond_health(request, state),
        (Method::Post, "/v1/chat/completions") => handle_chat_completion(request, state),
        (Method::Post, "/admin/health/reset") => handle_health_reset(request, state),
        _ => respond_error(request, 404, "not_found", "endpoint not found", None),
    }
}
