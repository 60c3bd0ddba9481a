// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the GraphQL query guard.
//!
//! Defaults mirror the limits enforced on the bastion's `/graphql` ingress:
//! 250 levels of brace nesting and runs of fewer than 10 directives.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Configuration for the query guard service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Query validation limits
    #[serde(default)]
    pub guard: GuardConfig,

    /// Request body capture limits
    #[serde(default)]
    pub body: BodyConfig,

    /// Where accepted queries are forwarded
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Limits applied to each query body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Deepest brace nesting still accepted (default: 250)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Length of a directive run that triggers rejection (default: 10)
    #[serde(default = "default_directive_run_threshold")]
    pub directive_run_threshold: usize,

    /// Route the guard is mounted on (default: /graphql)
    #[serde(default = "default_guard_path")]
    pub path: String,
}

/// Request body capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyConfig {
    /// Largest body read before validation, in bytes (default: 1 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Upstream GraphQL engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Absolute http(s) URL accepted queries are forwarded to. When unset the
    /// guard only reports that the query was validated.
    #[serde(default)]
    pub url: Option<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// Invalid configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("directive_run_threshold must be at least 1")]
    ZeroDirectiveThreshold,

    #[error("max_body_bytes must be at least 1")]
    ZeroBodyLimit,

    #[error("{field} must start with '/': {value}")]
    InvalidPath { field: &'static str, value: String },

    #[error("{field} collides with a built-in route: {value}")]
    ReservedPath { field: &'static str, value: String },

    #[error("Invalid upstream URL: {0}")]
    InvalidUpstream(String),
}

/// Routes served regardless of configuration.
pub const RESERVED_PATHS: &[&str] = &["/health", "/healthz", "/check"];

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_depth() -> usize {
    250
}

fn default_directive_run_threshold() -> usize {
    10
}

fn default_guard_path() -> String {
    "/graphql".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            guard: GuardConfig::default(),
            body: BodyConfig::default(),
            upstream: UpstreamConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            directive_run_threshold: default_directive_run_threshold(),
            path: default_guard_path(),
        }
    }
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    /// Check that the configuration can be served.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.guard.directive_run_threshold == 0 {
            return Err(ConfigError::ZeroDirectiveThreshold);
        }

        if self.body.max_body_bytes == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }

        check_path("guard.path", &self.guard.path)?;
        if self.metrics.enabled {
            check_path("metrics.path", &self.metrics.path)?;
            if self.metrics.path == self.guard.path {
                return Err(ConfigError::ReservedPath {
                    field: "metrics.path",
                    value: self.metrics.path.clone(),
                });
            }
        }

        if let Some(raw) = &self.upstream.url {
            let parsed = Url::parse(raw).map_err(|_| ConfigError::InvalidUpstream(raw.clone()))?;
            if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
                return Err(ConfigError::InvalidUpstream(raw.clone()));
            }
        }

        Ok(())
    }
}

fn check_path(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with('/') {
        return Err(ConfigError::InvalidPath {
            field,
            value: value.to_string(),
        });
    }
    if RESERVED_PATHS.contains(&value) {
        return Err(ConfigError::ReservedPath {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Parse an optional raw setting, keeping `default` when it is unset or
/// does not parse. A value that fails to parse is logged with its key.
pub fn parse_or<T: FromStr>(key: &str, raw: Option<&str>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = raw, "Invalid setting, falling back to default");
            default
        }
    }
}
