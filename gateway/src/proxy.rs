//! Buffered reverse proxy: the whole request body is read, forwarded with
//! method, path, query and end-to-end headers, and the upstream answer is
//! relayed the same way.

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName},
    response::Response,
};
use tracing::debug;

use crate::{error::GatewayError, router::AppState};

const UPSTREAM_REQUESTS: &str = "gateway_upstream_requests_total";
const UPSTREAM_ERRORS: &str = "gateway_upstream_errors_total";

static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    // Recomputed from the buffered body
    header::CONTENT_LENGTH,
];

/// A backend service the gateway forwards to.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub name: &'static str,
    base_url: String,
}

impl Upstream {
    pub fn new(name: &'static str, base_url: &str) -> Self {
        Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in Connection are hop-by-hop as well
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();

    for name in HOP_BY_HOP.iter().chain(named.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

pub async fn forward(
    client: &reqwest::Client,
    upstream: &Upstream,
    request: Request,
    max_body_bytes: usize,
) -> Result<Response, GatewayError> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = upstream.url(path_and_query);

    let body = to_bytes(body, max_body_bytes)
        .await
        .map_err(|_| GatewayError::BodyTooLarge)?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    debug!(upstream = upstream.name, method = %parts.method, url = %url, "forwarding request");
    let sent = client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await;

    let upstream_response = match sent {
        Ok(response) => response,
        Err(e) => {
            common_metrics::inc(
                UPSTREAM_ERRORS,
                &[("upstream".to_string(), upstream.name.to_string())],
                1,
            );
            return Err(if e.is_timeout() {
                GatewayError::Timeout(upstream.name)
            } else {
                GatewayError::Unreachable {
                    upstream: upstream.name,
                    reason: e.to_string(),
                }
            });
        }
    };

    let status = upstream_response.status();
    common_metrics::inc(
        UPSTREAM_REQUESTS,
        &[
            ("upstream".to_string(), upstream.name.to_string()),
            ("status".to_string(), status.as_u16().to_string()),
        ],
        1,
    );

    let mut headers = upstream_response.headers().clone();
    strip_hop_by_hop(&mut headers);
    let body = upstream_response
        .bytes()
        .await
        .map_err(|e| GatewayError::BadResponse {
            upstream: upstream.name,
            reason: e.to_string(),
        })?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

pub async fn store_proxy(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, GatewayError> {
    forward(&state.client, &state.store, request, state.max_body_bytes).await
}

pub async fn analysis_proxy(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, GatewayError> {
    forward(&state.client, &state.analysis, request, state.max_body_bytes).await
}

/// Liveness probe hitting an upstream's `/health_check`.
pub struct UpstreamProbe {
    client: reqwest::Client,
    upstream: Upstream,
}

impl UpstreamProbe {
    pub fn new(client: reqwest::Client, upstream: Upstream) -> Self {
        Self { client, upstream }
    }
}

#[async_trait]
impl health::Probe for UpstreamProbe {
    async fn probe(&self) -> bool {
        match self
            .client
            .get(self.upstream.url("/health_check"))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(upstream = self.upstream.name, status = %response.status(), "upstream unhealthy");
                false
            }
            Err(e) => {
                tracing::warn!(upstream = self.upstream.name, error = %e, "upstream unreachable");
                false
            }
        }
    }
}
