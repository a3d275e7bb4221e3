//! HTTP reverse proxy for `docker` deployments (spec.md §4.8, "HTTP reverse
//! proxy"). Strips the deployment path prefix and forwards the remainder to
//! the deployment's container on `127.0.0.1:<host_port>`.
//!
//! The teacher proxies to deployed services by resolving a target address
//! from its project registry and forwarding the request
//! (`shuttle-hq-shuttle`'s `gateway/src/proxy.rs`, grounding the
//! resolve-then-forward shape), but does so with a raw `hyper` service tied
//! to its older stack. That proxy type doesn't fit this crate's axum/reqwest
//! stack, so forwarding here is a plain per-request `reqwest::Client` call
//! instead (see DESIGN.md).

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use once_cell::sync::Lazy;
use tracing::warn;

use crate::error::{OrchestratorError, OrchestratorResult};

const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers that must not be copied across a proxy hop (RFC 7230 §6.1, plus
/// `host` since the downstream request targets a different authority).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(FORWARD_TIMEOUT)
        .build()
        .expect("reqwest client configuration is valid")
});

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.iter().any(|h| name.as_str().eq_ignore_ascii_case(h))
}

/// Forwards `method path_and_query` (with the deployment prefix already
/// stripped off `path_and_query`) to the container listening on
/// `host_port`, streaming the response body back unmodified.
pub async fn forward_to_container(
    host_port: u16,
    method: Method,
    path_and_query: &str,
    headers: HeaderMap,
    body: Bytes,
) -> OrchestratorResult<Response> {
    let url = format!("http://127.0.0.1:{host_port}{path_and_query}");

    let mut request = CLIENT.request(method, &url);
    for (name, value) in headers.iter() {
        if !is_hop_by_hop(name) {
            request = request.header(name, value);
        }
    }
    request = request.body(body);

    let upstream = request.send().await.map_err(|e| {
        warn!(url, error = %e, "proxy forward failed");
        OrchestratorError::Proxy(e.to_string())
    })?;

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream.headers().iter() {
        if !is_hop_by_hop(name) {
            response_headers.insert(name.clone(), value.clone());
        }
    }

    let body = upstream
        .bytes()
        .await
        .map_err(|e| OrchestratorError::Proxy(e.to_string()))?;

    let mut response = (status, body).into_response();
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// Strips a deployment's `path` prefix from the inbound request path,
/// preserving the query string. Falls back to `/` if the prefix consumes
/// the entire path.
pub fn strip_prefix<'a>(full_path: &'a str, prefix: &str) -> &'a str {
    match full_path.strip_prefix(prefix) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        Some(rest) => rest,
        None => full_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_matching_prefix() {
        assert_eq!(strip_prefix("/alice/hello/world", "/alice/hello"), "/world");
    }

    #[test]
    fn empty_remainder_becomes_root() {
        assert_eq!(strip_prefix("/alice/hello", "/alice/hello"), "/");
    }

    #[test]
    fn non_matching_prefix_is_left_untouched() {
        assert_eq!(strip_prefix("/bob/hi", "/alice/hello"), "/bob/hi");
    }

    #[test]
    fn hop_by_hop_headers_are_filtered() {
        assert!(is_hop_by_hop(&HeaderName::from_static("connection")));
        assert!(is_hop_by_hop(&HeaderName::from_static("host")));
        assert!(!is_hop_by_hop(&HeaderName::from_static("content-type")));
    }
}
