// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the GraphQL query guard service.
//!
//! The guard runs in one of two modes:
//!
//! 1. **External validation**: a fronting proxy posts the raw query to
//!    `/check` and reads the verdict from the JSON body.
//! 2. **Inline proxy**: queries sent to the guarded path pass through
//!    [`QueryGuardLayer`] and, once accepted, are forwarded upstream.

use crate::body::{BodyError, BufferedBody};
use crate::config::Config;
use crate::guard::QueryGuardLayer;
use crate::metrics::GuardMetrics;
use crate::validator::{QueryValidator, ValidationError, Verdict};
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use url::Url;

/// Shared application state.
pub struct AppState {
    pub validator: QueryValidator,
    pub metrics: GuardMetrics,
    pub config: Config,
    pub client: reqwest::Client,
}

/// Failure to build [`AppState`].
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, StateError> {
        // The upstream is an internal engine; system proxies do not apply
        let client = reqwest::Client::builder().no_proxy().build()?;

        Ok(Self {
            validator: QueryValidator::new(&config.guard),
            metrics: GuardMetrics::new()?,
            config,
            client,
        })
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Query check response.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/check", post(check))
        .route(
            &state.config.guard.path,
            post(forward).layer(QueryGuardLayer::new(state.clone())),
        );

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(render_metrics));
    }

    let body_limit = state.config.body.max_body_bytes;
    app.layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `400 Bad Request` carrying the rejection reason.
pub fn rejection_response(err: &ValidationError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            message: err.to_string(),
        }),
    )
        .into_response()
}

/// Response for a body that could not be captured.
pub fn body_error_response(err: &BodyError) -> Response {
    let status = match err {
        BodyError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        BodyError::Unreadable(_) => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorResponse {
            message: err.to_string(),
        }),
    )
        .into_response()
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "graphql-query-guard",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Validate a raw query body without forwarding it.
///
/// Verdicts are returned with `200` so the calling proxy can read the body.
pub async fn check(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Body) -> Response {
    let limit = state.config.body.max_body_bytes;
    let captured = match BufferedBody::check_declared_length(&headers, limit) {
        Ok(()) => BufferedBody::capture(body, limit).await,
        Err(err) => Err(err),
    };

    let buffered = match captured {
        Ok(buffered) => buffered,
        Err(err) => {
            warn!(error = %err, "Check body capture failed");
            state.metrics.observe_body_error(&err);
            return body_error_response(&err);
        }
    };

    let verdict = state.validator.validate(&buffered.text());
    state.metrics.observe(&verdict, buffered.len());

    let response = match verdict {
        Verdict::Accepted => {
            debug!(body_len = buffered.len(), "Check passed");
            CheckResponse {
                allowed: true,
                message: None,
                kind: None,
            }
        }
        Verdict::Rejected(err) => {
            info!(body_len = buffered.len(), kind = %err.kind(), error = %err, "Check failed");
            CheckResponse {
                allowed: false,
                message: Some(err.to_string()),
                kind: Some(err.kind().as_str()),
            }
        }
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Headers that describe a single connection and are not forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Upstream URL with the incoming query string appended to any query the
/// configured URL already carries.
pub fn upstream_url(base: &str, query: Option<&str>) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        let merged = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, query),
            _ => query.to_string(),
        };
        url.set_query(Some(&merged));
    }
    Ok(url)
}

/// Forward an accepted query to the upstream engine.
///
/// Only reached after [`QueryGuardLayer`] replayed the validated body. The
/// query string and end-to-end headers travel with it in both directions.
pub async fn forward(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(upstream) = state.config.upstream.url.as_deref() else {
        return (
            StatusCode::OK,
            [("X-Query-Validated", "true")],
            "Query validated successfully",
        )
            .into_response();
    };

    let target = match upstream_url(upstream, uri.query()) {
        Ok(target) => target,
        Err(err) => {
            warn!(upstream = %upstream, error = %err, "Upstream URL invalid");
            return upstream_unavailable();
        }
    };

    // axum speaks http 1.x, reqwest 0.11 speaks http 0.2
    let mut outgoing = reqwest::header::HeaderMap::new();
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            outgoing.append(name, value);
        }
    }

    let result = state
        .client
        .post(target)
        .headers(outgoing)
        .body(body)
        .send()
        .await;

    let upstream_response = match result {
        Ok(resp) => resp,
        Err(err) => {
            warn!(upstream = %upstream, error = %err, "Upstream request failed");
            return upstream_unavailable();
        }
    };

    let status = StatusCode::from_u16(upstream_response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);

    let mut relayed = HeaderMap::new();
    for (name, value) in upstream_response.headers().iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            relayed.append(name, value);
        }
    }

    let payload = match upstream_response.bytes().await {
        Ok(payload) => payload,
        Err(err) => {
            warn!(upstream = %upstream, error = %err, "Upstream body unreadable");
            return upstream_unavailable();
        }
    };

    let mut response = (status, payload).into_response();
    // Drop the octet-stream default set for raw bytes when upstream typed it
    if relayed.contains_key(header::CONTENT_TYPE) {
        response.headers_mut().remove(header::CONTENT_TYPE);
    }
    response.headers_mut().extend(relayed);
    response
}

fn upstream_unavailable() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse {
            message: "Upstream GraphQL service unavailable".to_string(),
        }),
    )
        .into_response()
}

/// Prometheus metrics endpoint.
pub async fn render_metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "Metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
