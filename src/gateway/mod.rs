//! Edge router: forwards requests to the stats or event service by path
//! prefix and leaves everything else unrouted.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::api::error_response;
use crate::config::GatewayConfig;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const STATS_PREFIXES: &[&str] = &["/hit", "/stats"];
const EVENTS_PREFIXES: &[&str] = &["/events", "/admin"];

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
    "content-length",
];

pub struct GatewayState {
    http: reqwest::Client,
    stats_url: String,
    events_url: String,
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

impl GatewayState {
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            stats_url: config.stats_url.trim_end_matches('/').to_string(),
            events_url: config.events_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upstream base URL for a request path
    pub fn upstream_for(&self, path: &str) -> Option<&str> {
        if STATS_PREFIXES.iter().any(|p| matches_prefix(path, p)) {
            Some(self.stats_url.as_str())
        } else if EVENTS_PREFIXES.iter().any(|p| matches_prefix(path, p)) {
            Some(self.events_url.as_str())
        } else {
            None
        }
    }
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(*name);
    }
    out
}

fn bad_gateway(message: impl Into<String>) -> Response {
    error_response(
        StatusCode::BAD_GATEWAY,
        "Upstream service is unavailable.",
        message,
    )
    .into_response()
}

async fn proxy(State(state): State<Arc<GatewayState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path();

    let Some(upstream) = state.upstream_for(path) else {
        return error_response(
            StatusCode::NOT_FOUND,
            "The required object was not found.",
            format!("No route for {path}"),
        )
        .into_response();
    };

    let target = match parts.uri.path_and_query() {
        Some(pq) => format!("{upstream}{}", pq.as_str()),
        None => format!("{upstream}{path}"),
    };

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body rejected.",
                e.to_string(),
            )
            .into_response();
        }
    };

    debug!(method = %parts.method, target = %target, "forwarding request");
    let upstream_response = match state
        .http
        .request(parts.method.clone(), &target)
        .headers(forwardable(&parts.headers))
        .body(body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(target = %target, error = %e, "upstream request failed");
            return bad_gateway(e.to_string());
        }
    };

    let status = upstream_response.status();
    let headers = forwardable(upstream_response.headers());
    match upstream_response.bytes().await {
        Ok(bytes) => (status, headers, Body::from(bytes)).into_response(),
        Err(e) => {
            warn!(target = %target, error = %e, "failed to read upstream response");
            bad_gateway(e.to_string())
        }
    }
}

pub fn create_gateway_router(state: GatewayState) -> Router {
    Router::new()
        .fallback(proxy)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GatewayState {
        GatewayState::new(&GatewayConfig {
            stats_url: "http://stats:9090/".to_string(),
            events_url: "http://events:8080".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_prefix_routing() {
        let state = state();
        assert_eq!(state.upstream_for("/hit"), Some("http://stats:9090"));
        assert_eq!(state.upstream_for("/hit/batch"), Some("http://stats:9090"));
        assert_eq!(state.upstream_for("/stats/unique"), Some("http://stats:9090"));
        assert_eq!(state.upstream_for("/events/7"), Some("http://events:8080"));
        assert_eq!(
            state.upstream_for("/admin/events/7/publish"),
            Some("http://events:8080")
        );
        assert_eq!(state.upstream_for("/hitlist"), None);
        assert_eq!(state.upstream_for("/"), None);
    }
}
