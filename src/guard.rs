// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Inline query guard middleware.
//!
//! [`QueryGuardLayer`] wraps a route so that every query body is read once,
//! validated, and either answered with `400 Bad Request` or handed to the
//! inner service with the captured body replayed.

use crate::body::BufferedBody;
use crate::handlers::{body_error_response, rejection_response, AppState};
use crate::validator::Verdict;
use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, info, warn};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Layer applying [`QueryGuard`] to a service.
#[derive(Clone)]
pub struct QueryGuardLayer {
    state: Arc<AppState>,
}

impl QueryGuardLayer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for QueryGuardLayer {
    type Service = QueryGuard<S>;

    fn layer(&self, inner: S) -> Self::Service {
        QueryGuard {
            inner,
            state: self.state.clone(),
        }
    }
}

/// Service validating query bodies before calling `inner`.
#[derive(Clone)]
pub struct QueryGuard<S> {
    inner: S,
    state: Arc<AppState>,
}

impl<S> Service<Request<Body>> for QueryGuard<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let state = self.state.clone();
        // Keep the service that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if carries_no_query(request.method()) {
                return inner.call(request).await;
            }

            match inspect(&state, request).await {
                Ok(request) => inner.call(request).await,
                Err(response) => Ok(response),
            }
        })
    }
}

fn carries_no_query(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Capture and validate the body of `request`.
///
/// Returns the request rebuilt around the replayed body when accepted, or the
/// response to send instead.
pub async fn inspect(state: &AppState, request: Request<Body>) -> Result<Request<Body>, Response> {
    let limit = state.config.body.max_body_bytes;
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let captured = match BufferedBody::check_declared_length(&parts.headers, limit) {
        Ok(()) => BufferedBody::capture(body, limit).await,
        Err(err) => Err(err),
    };

    let buffered = match captured {
        Ok(buffered) => buffered,
        Err(err) => {
            warn!(path = %path, error = %err, "Request body capture failed");
            state.metrics.observe_body_error(&err);
            return Err(body_error_response(&err));
        }
    };

    let verdict = state.validator.validate(&buffered.text());
    state.metrics.observe(&verdict, buffered.len());

    match verdict {
        Verdict::Accepted => {
            debug!(path = %path, body_len = buffered.len(), "Query accepted");
            Ok(Request::from_parts(parts, buffered.replay()))
        }
        Verdict::Rejected(err) => {
            info!(
                path = %path,
                body_len = buffered.len(),
                kind = %err.kind(),
                error = %err,
                "Query rejected"
            );
            Err(rejection_response(&err))
        }
    }
}
