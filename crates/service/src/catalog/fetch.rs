use freescan_core::catalog::{decode_catalog, free_models, ModelDescriptor};

const USER_AGENT_VALUE: &str = "freescan";

pub fn models_url(base_url: &str) -> String {
    format!("{}/api/v1/models", base_url.trim_end_matches('/'))
}

/// Catalog collaborator: one GET against the listing API, decoded and
/// restricted to free-tier non-router models. Any network, status, or decode
/// failure is a catalog-fetch error; callers decide whether it is fatal
/// (scanner, initial proxy load) or recoverable (background refresh).
pub fn fetch_free_models(
    client: &reqwest::blocking::Client,
    base_url: &str,
) -> Result<Vec<ModelDescriptor>, String> {
    let url = models_url(base_url);
    let build_request = |http: &reqwest::blocking::Client| {
        http.get(&url).header("User-Agent", USER_AGENT_VALUE)
    };

    let response = match build_request(client).send() {
        Ok(response) => response,
        Err(first_err) => {
            let fresh = crate::gateway::fresh_upstream_client();
            match build_request(&fresh).send() {
                Ok(response) => response,
                Err(second_err) => {
                    return Err(format!(
                        "catalog request failed: {first_err}; retry_after_fresh_client: {second_err}"
                    ));
                }
            }
        }
    };
    if !response.status().is_success() {
        let status = response.status();
        return Err(format!("catalog request failed: status={status}"));
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    if content_type.starts_with("text/html") {
        return Err("catalog request returned text/html (challenge page)".to_string());
    }
    let bytes = response
        .bytes()
        .map_err(|err| format!("catalog body read failed: {err}"))?;
    Ok(free_models(decode_catalog(bytes.as_ref())?))
}

/// Fetches against the configured base URL with the shared client; the entry
/// point both binaries use.
pub fn fetch_free_models_default() -> Result<Vec<ModelDescriptor>, String> {
    fetch_free_models(
        crate::gateway::upstream_client(),
        &crate::gateway::resolve_upstream_base_url(),
    )
}
