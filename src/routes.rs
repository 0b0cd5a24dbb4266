use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::error::RelayError;
use crate::prompt;
use crate::relay;
use crate::request::GenerateBody;
use crate::upstream::{Upstream, UpstreamRequest};

pub const DEFAULT_TRUSTED_PREFIX: &str = "https://llm.datasaur.ai/api/deployment";

/// Server-side defaults applied when a request does not carry its own.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub trusted_prefix: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            trusted_prefix: DEFAULT_TRUSTED_PREFIX.to_string(),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn Upstream>,
    pub settings: Arc<ServerSettings>,
}

impl AppState {
    pub fn new(upstream: Arc<dyn Upstream>, settings: ServerSettings) -> Self {
        Self {
            upstream,
            settings: Arc::new(settings),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .with_state(state)
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.filter(|s| !s.is_empty())
}

/// Pick the request's endpoint, else the configured one, and hold it to the trusted prefix.
pub fn resolve_endpoint(
    requested: Option<&str>,
    configured: Option<&str>,
    trusted_prefix: &str,
) -> Result<String, RelayError> {
    let endpoint = non_empty(requested).or(non_empty(configured)).unwrap_or("");

    if !endpoint.is_empty() && !endpoint.starts_with(trusted_prefix) {
        return Err(RelayError::UntrustedEndpoint {
            prefix: trusted_prefix.to_string(),
        });
    }
    if endpoint.is_empty() {
        return Err(RelayError::MissingEndpoint);
    }
    Ok(endpoint.to_string())
}

fn message(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "message": "Failed to process request" })),
    )
        .into_response()
}

/// `POST /api/generate`
pub async fn generate(State(state): State<AppState>, body: Bytes) -> Response {
    let body: GenerateBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "rejecting unparseable request body");
            return message(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let endpoint = match resolve_endpoint(
        body.endpoint.as_deref(),
        state.settings.endpoint.as_deref(),
        &state.settings.trusted_prefix,
    ) {
        Ok(endpoint) => endpoint,
        Err(e) if e.is_validation() => {
            warn!(reason = %e, "rejecting request endpoint");
            return message(StatusCode::BAD_REQUEST, &e.to_string());
        }
        Err(e) => {
            error!(error = %e, "failed to resolve endpoint");
            return failed();
        }
    };

    let api_key = non_empty(body.api_key.as_deref())
        .or(non_empty(state.settings.api_key.as_deref()))
        .map(str::to_string);

    let style = body.style();
    info!(
        platform = ?body.service,
        stream = body.stream,
        source_urls = body.is_source_urls,
        styled = style.is_some(),
        upstream = state.upstream.name(),
        "accepted generation request"
    );

    let req = UpstreamRequest {
        endpoint,
        api_key,
        stream: body.stream,
        messages: prompt::compose(body.service, &body.source(), style.as_ref()),
    };

    if body.stream {
        stream_response(state.upstream.clone(), req)
    } else {
        forward(state.upstream.as_ref(), req).await
    }
}

fn stream_response(upstream: Arc<dyn Upstream>, req: UpstreamRequest) -> Response {
    let lines = relay::stream_events(upstream, req)
        .map(|item| item.and_then(|ev| ev.to_line().map_err(RelayError::from)));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(lines),
    )
        .into_response()
}

/// Non-streaming fallback: upstream JSON is passed through untouched.
async fn forward(upstream: &dyn Upstream, req: UpstreamRequest) -> Response {
    let resp = match upstream.send(req).await {
        Ok(resp) => resp,
        Err(e) => {
            error!(error = %format!("{e:#}"), "upstream request failed");
            return failed();
        }
    };

    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let bytes = match resp.collect().await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %format!("{e:#}"), "failed to read upstream body");
            return failed();
        }
    };

    if let Err(e) = serde_json::from_slice::<serde_json::Value>(&bytes) {
        error!(error = %e, %status, "upstream returned a non-JSON body");
        return failed();
    }

    (status, [(header::CONTENT_TYPE, "application/json")], bytes).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "https://llm.example/api/deployment";

    #[test]
    fn request_endpoint_wins_over_configured() {
        let got = resolve_endpoint(
            Some("https://llm.example/api/deployment/mine"),
            Some("https://llm.example/api/deployment/default"),
            PREFIX,
        )
        .unwrap();
        assert_eq!(got, "https://llm.example/api/deployment/mine");
    }

    #[test]
    fn empty_request_endpoint_falls_back() {
        let got = resolve_endpoint(Some(""), Some("https://llm.example/api/deployment/d"), PREFIX).unwrap();
        assert_eq!(got, "https://llm.example/api/deployment/d");
    }

    #[test]
    fn missing_and_untrusted_endpoints() {
        assert!(matches!(
            resolve_endpoint(None, None, PREFIX),
            Err(RelayError::MissingEndpoint)
        ));
        assert!(matches!(
            resolve_endpoint(Some("https://evil.example/api/deployment"), None, PREFIX),
            Err(RelayError::UntrustedEndpoint { .. })
        ));
    }
}
