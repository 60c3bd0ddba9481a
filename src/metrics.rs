// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for the query guard.

use crate::body::BodyError;
use crate::validator::Verdict;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Counters and histograms owned by one guard instance.
#[derive(Clone)]
pub struct GuardMetrics {
    registry: Registry,
    requests: IntCounterVec,
    rejections: IntCounterVec,
    body_errors: IntCounterVec,
    body_bytes: Histogram,
}

impl GuardMetrics {
    /// Create metrics registered in a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("query_guard_requests_total", "Queries inspected, by verdict"),
            &["verdict"],
        )?;
        let rejections = IntCounterVec::new(
            Opts::new("query_guard_rejections_total", "Rejected queries, by kind"),
            &["kind"],
        )?;
        let body_errors = IntCounterVec::new(
            Opts::new(
                "query_guard_body_errors_total",
                "Request bodies that could not be captured",
            ),
            &["reason"],
        )?;
        let body_bytes = Histogram::with_opts(
            HistogramOpts::new("query_guard_body_bytes", "Size of inspected bodies").buckets(
                prometheus::exponential_buckets(64.0, 4.0, 8)?,
            ),
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(rejections.clone()))?;
        registry.register(Box::new(body_errors.clone()))?;
        registry.register(Box::new(body_bytes.clone()))?;

        Ok(Self {
            registry,
            requests,
            rejections,
            body_errors,
            body_bytes,
        })
    }

    /// Record the verdict for a body of `body_len` bytes.
    pub fn observe(&self, verdict: &Verdict, body_len: usize) {
        self.body_bytes.observe(body_len as f64);
        match verdict.kind() {
            None => self.requests.with_label_values(&["accepted"]).inc(),
            Some(kind) => {
                self.requests.with_label_values(&["rejected"]).inc();
                self.rejections.with_label_values(&[kind.as_str()]).inc();
            }
        }
    }

    pub fn observe_body_error(&self, err: &BodyError) {
        self.body_errors.with_label_values(&[err.reason()]).inc();
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn requests(&self, verdict: &str) -> u64 {
        self.requests.with_label_values(&[verdict]).get()
    }

    pub fn rejections(&self, kind: &str) -> u64 {
        self.rejections.with_label_values(&[kind]).get()
    }

    pub fn body_errors(&self, reason: &str) -> u64 {
        self.body_errors.with_label_values(&[reason]).get()
    }
}
