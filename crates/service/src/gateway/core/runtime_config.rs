use std::sync::OnceLock;
use std::time::Duration;

use super::upstream::backoff::BackoffPolicy;

pub(crate) const DEFAULT_UPSTREAM_BASE_URL: &str = "https://openrouter.ai";
pub const DEFAULT_ERROR_THRESHOLD: u32 = 3;
const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TOTAL_TIMEOUT_SECS: u64 = 180;
const DEFAULT_SAME_MODEL_RETRIES: u32 = 1;
const DEFAULT_BACKOFF_BASE_MS: u64 = 250;
const DEFAULT_BACKOFF_CAP_MS: u64 = 4_000;
const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const ENV_UPSTREAM_BASE_URL: &str = "FREESCAN_UPSTREAM_BASE_URL";
const ENV_ATTEMPT_TIMEOUT_SECS: &str = "FREESCAN_UPSTREAM_TIMEOUT_SECS";
const ENV_TOTAL_TIMEOUT_SECS: &str = "FREESCAN_TOTAL_TIMEOUT_SECS";
const ENV_SAME_MODEL_RETRIES: &str = "FREESCAN_SAME_MODEL_RETRIES";
const ENV_BACKOFF_BASE_MS: &str = "FREESCAN_BACKOFF_BASE_MS";
const ENV_BACKOFF_CAP_MS: &str = "FREESCAN_BACKOFF_CAP_MS";
const ENV_MAX_BODY_BYTES: &str = "FREESCAN_MAX_BODY_BYTES";

static UPSTREAM_CLIENT: OnceLock<reqwest::blocking::Client> = OnceLock::new();

fn env_u64_or(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

/// Base URL of the OpenRouter-compatible upstream, shared by the catalog
/// fetch and the chat-completion dispatch. Overridable so tests can point the
/// whole service at a local mock.
pub(crate) fn resolve_upstream_base_url() -> String {
    let raw = std::env::var(ENV_UPSTREAM_BASE_URL)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE_URL.to_string());
    match url::Url::parse(&raw) {
        Ok(_) => raw,
        Err(err) => {
            log::warn!("invalid {ENV_UPSTREAM_BASE_URL}={raw}: {err}; using default");
            DEFAULT_UPSTREAM_BASE_URL.to_string()
        }
    }
}

pub(crate) fn max_request_body_bytes() -> usize {
    env_u64_or(ENV_MAX_BODY_BYTES, DEFAULT_MAX_BODY_BYTES as u64) as usize
}

/// Per-request routing knobs, resolved once at gateway construction so a
/// request never sees a half-applied env change.
#[derive(Debug, Clone)]
pub(crate) struct RouterConfig {
    pub(crate) upstream_base_url: String,
    pub(crate) attempt_timeout: Duration,
    pub(crate) total_timeout: Option<Duration>,
    pub(crate) same_model_retries: u32,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) error_threshold: u32,
}

impl RouterConfig {
    pub(crate) fn from_env(error_threshold: u32) -> Self {
        let total_secs = env_u64_or(ENV_TOTAL_TIMEOUT_SECS, DEFAULT_TOTAL_TIMEOUT_SECS);
        Self {
            upstream_base_url: resolve_upstream_base_url(),
            attempt_timeout: Duration::from_secs(
                env_u64_or(ENV_ATTEMPT_TIMEOUT_SECS, DEFAULT_ATTEMPT_TIMEOUT_SECS).max(1),
            ),
            // 0 disables the end-to-end deadline.
            total_timeout: (total_secs > 0).then(|| Duration::from_secs(total_secs)),
            same_model_retries: env_u64_or(
                ENV_SAME_MODEL_RETRIES,
                DEFAULT_SAME_MODEL_RETRIES as u64,
            ) as u32,
            backoff: BackoffPolicy::new(
                Duration::from_millis(env_u64_or(ENV_BACKOFF_BASE_MS, DEFAULT_BACKOFF_BASE_MS)),
                Duration::from_millis(env_u64_or(ENV_BACKOFF_CAP_MS, DEFAULT_BACKOFF_CAP_MS)),
            ),
            error_threshold: error_threshold.max(1),
        }
    }

    pub(crate) fn chat_completions_url(&self) -> String {
        format!("{}/api/v1/chat/completions", self.upstream_base_url)
    }
}

pub(crate) fn upstream_client() -> &'static reqwest::blocking::Client {
    UPSTREAM_CLIENT.get_or_init(|| {
        reqwest::blocking::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new())
    })
}

/// One-shot client for the retry after a connection-level failure; the
/// singleton's pooled connections may be pinned to a dead network path.
pub(crate) fn fresh_upstream_client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new())
}
