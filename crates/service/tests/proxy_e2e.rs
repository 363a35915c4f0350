use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use freescan_core::criteria::{FilterCriteria, SortField};
use freescan_service::ProxyOptions;

// Env-driven config is process-global; tests build their own gateway per
// scenario, so they serialize on this lock.
static TEST_LOCK: Mutex<()> = Mutex::new(());

struct EnvGuard {
    key: &'static str,
    original: Option<std::ffi::OsString>,
}

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> Self {
        let original = std::env::var_os(key);
        std::env::set_var(key, value);
        Self { key, original }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        if let Some(val) = &self.original {
            std::env::set_var(self.key, val);
        } else {
            std::env::remove_var(self.key);
        }
    }
}

struct MockUpstream {
    addr: String,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

/// Serves a fixed catalog plus scripted chat-completion statuses per model
/// id (models absent from the script answer 200).
fn start_mock_upstream(
    models: &[(&str, u64)],
    statuses: HashMap<String, u16>,
) -> MockUpstream {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("bind mock upstream");
    let addr = server
        .server_addr()
        .to_ip()
        .expect("mock upstream addr")
        .to_string();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let calls_for_server = Arc::clone(&calls);
    let catalog_entries: Vec<serde_json::Value> = models
        .iter()
        .map(|(id, context_length)| {
            serde_json::json!({
                "id": id,
                "name": id,
                "context_length": context_length,
                "pricing": { "prompt": "0", "completion": "0" },
                "supported_parameters": ["tools"],
            })
        })
        .collect();
    let catalog_body = serde_json::json!({ "data": catalog_entries }).to_string();

    std::thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let path = request.url().split('?').next().unwrap_or("/").to_string();
            match path.as_str() {
                "/api/v1/models" => {
                    let response = tiny_http::Response::from_string(catalog_body.clone())
                        .with_header(
                            tiny_http::Header::from_bytes(
                                b"Content-Type".as_slice(),
                                b"application/json".as_slice(),
                            )
                            .expect("header"),
                        );
                    let _ = request.respond(response);
                }
                "/api/v1/chat/completions" => {
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    let payload: serde_json::Value =
                        serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
                    let model = payload
                        .get("model")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("missing")
                        .to_string();
                    calls_for_server
                        .lock()
                        .expect("calls lock")
                        .push(model.clone());
                    let status = statuses.get(&model).copied().unwrap_or(200);
                    let body = if status == 200 {
                        serde_json::json!({
                            "id": "chatcmpl-mock",
                            "object": "chat.completion",
                            "model": model,
                            "choices": [
                                { "index": 0, "message": { "role": "assistant", "content": "ok" } }
                            ],
                        })
                        .to_string()
                    } else {
                        serde_json::json!({ "error": { "message": "scripted failure" } })
                            .to_string()
                    };
                    let response = tiny_http::Response::from_string(body)
                        .with_status_code(status)
                        .with_header(
                            tiny_http::Header::from_bytes(
                                b"Content-Type".as_slice(),
                                b"application/json".as_slice(),
                            )
                            .expect("header"),
                        );
                    let _ = request.respond(response);
                }
                _ => {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                }
            }
        }
    });

    MockUpstream { addr, calls }
}

fn http_request(
    addr: &str,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).expect("connect server");
    let mut request = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (name, value) in headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some(body) = body {
        request.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    } else {
        request.push_str("\r\n");
    }
    stream.write_all(request.as_bytes()).expect("write request");
    let mut raw = String::new();
    stream.read_to_string(&mut raw).expect("read response");

    let status = raw
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .expect("status line");
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, rest)| rest.to_string())
        .unwrap_or_default();
    (status, body)
}

fn post_chat(addr: &str, payload: &serde_json::Value) -> (u16, String) {
    http_request(
        addr,
        "POST",
        "/v1/chat/completions",
        &[
            ("Authorization", "Bearer test-key"),
            ("Content-Type", "application/json"),
        ],
        Some(&payload.to_string()),
    )
}

fn common_env(base_url: &str) -> Vec<EnvGuard> {
    vec![
        EnvGuard::set("FREESCAN_UPSTREAM_BASE_URL", base_url),
        EnvGuard::set("FREESCAN_CATALOG_REFRESH_SECS", "0"),
        EnvGuard::set("FREESCAN_BACKOFF_BASE_MS", "1"),
        EnvGuard::set("FREESCAN_BACKOFF_CAP_MS", "2"),
        EnvGuard::set("FREESCAN_TOTAL_TIMEOUT_SECS", "30"),
    ]
}

fn proxy_options(error_threshold: u32) -> ProxyOptions {
    ProxyOptions {
        criteria: FilterCriteria::default(),
        sort_field: SortField::ContextLength,
        reverse: true,
        error_threshold,
    }
}

fn start_proxy(error_threshold: u32) -> String {
    let state = freescan_service::bootstrap_gateway(proxy_options(error_threshold))
        .expect("bootstrap gateway");
    let handle = freescan_service::start_background_server("127.0.0.1:0", state)
        .expect("start proxy server");
    handle.addr
}

#[test]
fn failover_skips_failed_model_and_overrides_client_choice() {
    let _guard = TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // alpha fails non-retryably, beta succeeds, gamma must never be hit.
    let mut statuses = HashMap::new();
    statuses.insert("alpha/one".to_string(), 400);
    let mock = start_mock_upstream(
        &[("alpha/one", 3000), ("beta/two", 2000), ("gamma/three", 1000)],
        statuses,
    );
    let _env = common_env(&mock.base_url());
    let addr = start_proxy(3);

    let (status, body) = post_chat(
        &addr,
        &serde_json::json!({
            "model": "client-picked-model",
            "messages": [{ "role": "user", "content": "hi" }],
        }),
    );
    assert_eq!(status, 200);
    let payload: serde_json::Value = serde_json::from_str(&body).expect("json body");
    // The proxy substitutes its own candidate for the client's model.
    assert_eq!(payload["model"], "beta/two");

    assert_eq!(mock.calls(), vec!["alpha/one".to_string(), "beta/two".to_string()]);
}

#[test]
fn transient_errors_disable_model_at_threshold_then_503() {
    let _guard = TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut statuses = HashMap::new();
    statuses.insert("delta/only".to_string(), 429);
    let mock = start_mock_upstream(&[("delta/only", 1000)], statuses);
    let _env = common_env(&mock.base_url());
    // No same-model retries: each request records exactly one failure.
    let _retries = EnvGuard::set("FREESCAN_SAME_MODEL_RETRIES", "0");
    let addr = start_proxy(2);

    let payload = serde_json::json!({
        "model": "whatever",
        "messages": [{ "role": "user", "content": "hi" }],
    });

    let (status, body) = post_chat(&addr, &payload);
    assert_eq!(status, 502);
    let envelope: serde_json::Value = serde_json::from_str(&body).expect("error envelope");
    assert_eq!(envelope["error"]["type"], "request_exhausted");
    assert_eq!(envelope["error"]["models_attempted"], 1);

    let (status, _) = post_chat(&addr, &payload);
    assert_eq!(status, 502);

    // Threshold reached: the model is out of rotation, terminal 503.
    let (status, body) = post_chat(&addr, &payload);
    assert_eq!(status, 503);
    let envelope: serde_json::Value = serde_json::from_str(&body).expect("error envelope");
    assert_eq!(envelope["error"]["type"], "no_available_models");
    assert_eq!(mock.calls().len(), 2);

    let (status, body) = http_request(&addr, "GET", "/health", &[], None);
    assert_eq!(status, 200);
    let health: serde_json::Value = serde_json::from_str(&body).expect("health body");
    assert_eq!(health["disabled"], serde_json::json!(["delta/only"]));

    // Administrative reset restores the model.
    let (status, _) = http_request(&addr, "POST", "/admin/health/reset", &[], None);
    assert_eq!(status, 200);
    let (status, body) = http_request(&addr, "GET", "/health", &[], None);
    assert_eq!(status, 200);
    let health: serde_json::Value = serde_json::from_str(&body).expect("health body");
    assert_eq!(health["disabled_count"], 0);
}

#[test]
fn deadline_elapsing_during_backoff_terminates_promptly() {
    let _guard = TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut statuses = HashMap::new();
    statuses.insert("epsilon/slow".to_string(), 429);
    let mock = start_mock_upstream(&[("epsilon/slow", 1000)], statuses);
    let _env = common_env(&mock.base_url());
    // A backoff draw far beyond the 1s deadline: the request must terminate
    // when the deadline elapses, not after the full backoff.
    let _base = EnvGuard::set("FREESCAN_BACKOFF_BASE_MS", "30000");
    let _cap = EnvGuard::set("FREESCAN_BACKOFF_CAP_MS", "30000");
    let _total = EnvGuard::set("FREESCAN_TOTAL_TIMEOUT_SECS", "1");
    // A deep retry budget keeps the request on the same model until the
    // deadline fires, so the terminal class is the deadline, not exhaustion.
    let _retries = EnvGuard::set("FREESCAN_SAME_MODEL_RETRIES", "50");
    let addr = start_proxy(10);

    let started = Instant::now();
    let (status, body) = post_chat(
        &addr,
        &serde_json::json!({
            "model": "whatever",
            "messages": [{ "role": "user", "content": "hi" }],
        }),
    );
    assert_eq!(status, 504);
    assert!(started.elapsed() < Duration::from_secs(10));
    let envelope: serde_json::Value = serde_json::from_str(&body).expect("error envelope");
    assert_eq!(envelope["error"]["type"], "deadline_exceeded");
}

#[test]
fn models_endpoint_lists_candidates_in_failover_order() {
    let _guard = TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let mock = start_mock_upstream(
        &[("small/ctx", 1000), ("large/ctx", 9000), ("mid/ctx", 5000)],
        HashMap::new(),
    );
    let _env = common_env(&mock.base_url());
    let addr = start_proxy(3);

    let (status, body) = http_request(&addr, "GET", "/v1/models", &[], None);
    assert_eq!(status, 200);
    let listing: serde_json::Value = serde_json::from_str(&body).expect("model list");
    assert_eq!(listing["object"], "list");
    let ids: Vec<&str> = listing["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|entry| entry["id"].as_str().expect("id"))
        .collect();
    // context_length descending, the proxy's default rotation order.
    assert_eq!(ids, vec!["large/ctx", "mid/ctx", "small/ctx"]);
}

#[test]
fn chat_completions_requires_bearer_auth() {
    let _guard = TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let mock = start_mock_upstream(&[("any/model", 1000)], HashMap::new());
    let _env = common_env(&mock.base_url());
    let addr = start_proxy(3);

    let (status, body) = http_request(
        &addr,
        "POST",
        "/v1/chat/completions",
        &[("Content-Type", "application/json")],
        Some(r#"{"model":"x","messages":[]}"#),
    );
    assert_eq!(status, 401);
    let envelope: serde_json::Value = serde_json::from_str(&body).expect("error envelope");
    assert_eq!(envelope["error"]["type"], "invalid_request");
    assert!(mock.calls().is_empty());
}
