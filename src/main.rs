// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! GraphQL Query Guard Service
//!
//! An ingress-level validator for GraphQL endpoints. Query bodies are
//! rejected when they contain long directive runs, excessive brace nesting,
//! or unmatched braces.
//!
//! ## Usage
//!
//! The service provides two modes of operation:
//!
//! 1. **External validation**: Envoy or another proxy posts the query body to
//!    `/check` and reads the verdict.
//!
//! 2. **Inline proxy**: Queries are sent to the guarded path, validated, and
//!    forwarded to `UPSTREAM_URL`.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `MAX_DEPTH`: Deepest accepted brace nesting (default: 250)
//! - `DIRECTIVE_RUN_THRESHOLD`: Directive run length rejected (default: 10)
//! - `GUARD_PATH`: Guarded route (default: /graphql)
//! - `MAX_BODY_BYTES`: Body size cap (default: 1048576)
//! - `UPSTREAM_URL`: GraphQL engine to forward accepted queries to
//! - `METRICS_ENABLED`, `METRICS_PATH`: Prometheus endpoint (default: true, /metrics)

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use graphql_query_guard::{
    config::{parse_or, BodyConfig, Config, GuardConfig, MetricsConfig, UpstreamConfig},
    handlers::{router, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = load_config();
    config.validate()?;
    info!(
        bind_addr = %config.bind_addr,
        max_depth = config.guard.max_depth,
        directive_run_threshold = config.guard.directive_run_threshold,
        guard_path = %config.guard.path,
        max_body_bytes = config.body.max_body_bytes,
        upstream = ?config.upstream.url,
        "Starting GraphQL query guard"
    );

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    // Start server
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Load configuration from environment variables.
fn load_config() -> Config {
    let guard = GuardConfig::default();
    let body = BodyConfig::default();
    let metrics = MetricsConfig::default();

    Config {
        bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        guard: GuardConfig {
            max_depth: env_or("MAX_DEPTH", guard.max_depth),
            directive_run_threshold: env_or(
                "DIRECTIVE_RUN_THRESHOLD",
                guard.directive_run_threshold,
            ),
            path: std::env::var("GUARD_PATH").unwrap_or(guard.path),
        },
        body: BodyConfig {
            max_body_bytes: env_or("MAX_BODY_BYTES", body.max_body_bytes),
        },
        upstream: UpstreamConfig {
            url: std::env::var("UPSTREAM_URL").ok().filter(|v| !v.trim().is_empty()),
        },
        metrics: MetricsConfig {
            enabled: env_or("METRICS_ENABLED", metrics.enabled),
            path: std::env::var("METRICS_PATH").unwrap_or(metrics.path),
        },
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    parse_or(key, std::env::var(key).ok().as_deref(), default)
}
