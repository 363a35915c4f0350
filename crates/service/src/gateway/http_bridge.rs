use tiny_http::{Header, Request, Response, StatusCode};

/// Hop-by-hop headers tiny_http manages itself; everything else — including
/// the upstream `x-ratelimit-*` and `retry-after` headers — passes through.
fn should_drop_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("transfer-encoding")
        || name.eq_ignore_ascii_case("content-length")
        || name.eq_ignore_ascii_case("connection")
}

fn build_headers(pairs: &[(String, String)]) -> Vec<Header> {
    let mut headers = Vec::with_capacity(pairs.len());
    for (name, value) in pairs {
        if should_drop_header(name) {
            continue;
        }
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            headers.push(header);
        }
    }
    headers
}

/// A fully-buffered upstream success, forwarded verbatim.
pub(super) fn respond_buffered(
    request: Request,
    status: u16,
    header_pairs: &[(String, String)],
    body: bytes::Bytes,
) {
    let headers = build_headers(header_pairs);
    let len = Some(body.len());
    let response = Response::new(
        StatusCode(status),
        headers,
        std::io::Cursor::new(body),
        len,
        None,
    );
    let _ = request.respond(response);
}

/// An SSE upstream success, forwarded incrementally. The upstream body is
/// handed to tiny_http as the response reader, so bytes flow to the client
/// as they arrive and the connection is torn down on either side's error.
pub(super) fn respond_streaming(request: Request, upstream: reqwest::blocking::Response) {
    let status = StatusCode(upstream.status().as_u16());
    let header_pairs: Vec<(String, String)> = upstream
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let headers = build_headers(&header_pairs);
    let response = Response::new(status, headers, upstream, None, None);
    let _ = request.respond(response);
}
