//! HTTP forwarding to the ledger API
//!
//! Attaches the cached bearer token, forwards the request to
//! `{api_base}/{path}`, and returns the upstream response verbatim —
//! including non-2xx statuses and 204s. Hop-by-hop headers are stripped
//! from upstream responses before they reach the client.

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, instrument};

use ledger_auth::{TokenCache, Vault};

use crate::error::{ApiError, envelope};
use crate::metrics;

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Maximum request body size forwarded upstream
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state passed to all API handlers via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    pub api_base: String,
    pub vault: Arc<Vault>,
    pub tokens: Arc<TokenCache>,
    pub timeout: Duration,
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
}

impl ProxyState {
    /// Upstream URL for a path under the ledger API base.
    fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        let base = self.api_base.trim_end_matches('/');
        match query {
            Some(query) if !query.is_empty() => format!("{base}/{path}?{query}"),
            _ => format!("{base}/{path}"),
        }
    }
}

/// Forward a request to the ledger API and return the upstream response.
///
/// The body, when present, is forwarded as JSON (the only content the demo
/// frontend sends). `method` may differ from the inbound method — the
/// `/filter` routes re-issue POSTs as GET-with-body upstream.
#[instrument(skip_all, fields(request_id = %request_id, method = %method, path = %path))]
pub async fn forward_to_ledger(
    state: &ProxyState,
    method: Method,
    path: &str,
    query: Option<&str>,
    body: Option<Bytes>,
    request_id: &str,
) -> Response {
    state.requests_total.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();
    let method_label = method.to_string();

    let token = match state.tokens.get_access_token().await {
        Ok(token) => token,
        Err(e) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            return ApiError::Auth(e).into_response();
        }
    };

    if let Some(bytes) = &body
        && bytes.len() > MAX_BODY_BYTES
    {
        state.errors_total.fetch_add(1, Ordering::Relaxed);
        return envelope(
            StatusCode::BAD_REQUEST,
            "request body too large",
            Some(request_id),
        );
    }

    let url = state.upstream_url(path, query);
    let mut request = state
        .client
        .request(method, &url)
        .bearer_auth(token)
        .timeout(state.timeout);
    if let Some(bytes) = body.filter(|b| !b.is_empty()) {
        request = request
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(bytes);
    }

    let upstream_response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            metrics::record_upstream_error(if e.is_timeout() { "timeout" } else { "transport" });
            error!(error = %e, url = %url, "upstream request failed");
            return ApiError::UpstreamTransport(e.to_string()).into_response();
        }
    };

    let status = upstream_response.status();
    let resp_headers = upstream_response.headers().clone();
    let resp_body = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            metrics::record_upstream_error("read");
            error!(error = %e, url = %url, "failed to read upstream response body");
            return ApiError::UpstreamTransport(e.to_string()).into_response();
        }
    };

    if !status.is_success() {
        state.errors_total.fetch_add(1, Ordering::Relaxed);
        metrics::record_upstream_error("status");
    }
    metrics::record_request(status.as_u16(), &method_label, started.elapsed().as_secs_f64());

    let mut response = Response::builder().status(status);
    for (name, value) in &resp_headers {
        if !is_hop_by_hop(name.as_str()) {
            response = response.header(name, value);
        }
    }
    response
        .body(axum::body::Body::from(resp_body))
        .unwrap_or_else(|e| {
            envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                "response build error",
                Some(&e.to_string()),
            )
        })
}

/// GET a ledger API path and return the upstream status and body text.
///
/// Used where the handler needs the payload rather than a passthrough
/// response: the connection test and the account-balances join. Transport
/// and token failures surface as `ApiError`; non-2xx statuses do not — the
/// caller decides what a failure status means.
pub async fn fetch_from_ledger(
    state: &ProxyState,
    path: &str,
    query: Option<&str>,
    body: Option<Bytes>,
) -> Result<(u16, String), ApiError> {
    let token = state.tokens.get_access_token().await?;

    let url = state.upstream_url(path, query);
    let mut request = state
        .client
        .get(&url)
        .bearer_auth(token)
        .timeout(state.timeout);
    if let Some(bytes) = body.filter(|b| !b.is_empty()) {
        request = request
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(bytes);
    }

    let response = request
        .send()
        .await
        .map_err(|e| ApiError::UpstreamTransport(e.to_string()))?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::UpstreamTransport(e.to_string()))?;
    Ok((status, body))
}

/// Check if a header is hop-by-hop (stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
