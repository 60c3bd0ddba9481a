// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Metrics collection for attack simulation results.

use graphql_query_guard::{RejectionKind, Verdict};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Collects metrics during attack simulation.
#[derive(Debug, Default)]
pub struct AttackMetrics {
    /// Start time of the attack
    start_time: Option<Instant>,
    /// End time of the attack
    end_time: Option<Instant>,
    /// Count of requests by outcome
    outcomes: HashMap<Outcome, usize>,
    /// Bytes of query text inspected
    bytes_inspected: usize,
    /// Latency samples (microseconds)
    latencies: Vec<u64>,
}

/// Possible outcomes for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Accepted,
    DirectiveOverflow,
    DepthExceeded,
    UnbalancedBraces,
}

impl From<&Verdict> for Outcome {
    fn from(verdict: &Verdict) -> Self {
        match verdict.kind() {
            None => Outcome::Accepted,
            Some(RejectionKind::DirectiveOverflow) => Outcome::DirectiveOverflow,
            Some(RejectionKind::DepthExceeded) => Outcome::DepthExceeded,
            Some(RejectionKind::UnbalancedBraces) => Outcome::UnbalancedBraces,
        }
    }
}

impl From<RejectionKind> for Outcome {
    fn from(kind: RejectionKind) -> Self {
        match kind {
            RejectionKind::DirectiveOverflow => Outcome::DirectiveOverflow,
            RejectionKind::DepthExceeded => Outcome::DepthExceeded,
            RejectionKind::UnbalancedBraces => Outcome::UnbalancedBraces,
        }
    }
}

impl AttackMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of an attack.
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Mark the end of an attack.
    pub fn finish(&mut self) {
        self.end_time = Some(Instant::now());
    }

    /// Record a request outcome.
    pub fn record(&mut self, outcome: Outcome, body_len: usize, latency: Duration) {
        *self.outcomes.entry(outcome).or_insert(0) += 1;
        self.bytes_inspected += body_len;
        self.latencies.push(latency.as_micros() as u64);
    }

    /// Get total request count.
    pub fn total_requests(&self) -> usize {
        self.outcomes.values().sum()
    }

    /// Get count for a specific outcome.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Get duration of the attack.
    pub fn duration(&self) -> Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Get block rate (ratio of rejected to total).
    pub fn block_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        let accepted = self.count(Outcome::Accepted);
        (total - accepted) as f64 / total as f64
    }

    fn sorted_latencies(&self) -> Vec<u64> {
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();
        sorted
    }

    /// Get median latency in microseconds.
    pub fn median_latency_us(&self) -> u64 {
        let sorted = self.sorted_latencies();
        sorted.get(sorted.len() / 2).copied().unwrap_or(0)
    }

    /// Get p99 latency in microseconds.
    pub fn p99_latency_us(&self) -> u64 {
        let sorted = self.sorted_latencies();
        if sorted.is_empty() {
            return 0;
        }
        let idx = (sorted.len() as f64 * 0.99) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    /// Generate a summary report.
    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            total_requests: self.total_requests(),
            accepted: self.count(Outcome::Accepted),
            directive_overflow: self.count(Outcome::DirectiveOverflow),
            depth_exceeded: self.count(Outcome::DepthExceeded),
            unbalanced_braces: self.count(Outcome::UnbalancedBraces),
            bytes_inspected: self.bytes_inspected,
            duration_ms: self.duration().as_millis() as u64,
            block_rate: self.block_rate(),
            median_latency_us: self.median_latency_us(),
            p99_latency_us: self.p99_latency_us(),
        }
    }
}

/// Summary report of attack metrics.
#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub total_requests: usize,
    pub accepted: usize,
    pub directive_overflow: usize,
    pub depth_exceeded: usize,
    pub unbalanced_braces: usize,
    pub bytes_inspected: usize,
    pub duration_ms: u64,
    pub block_rate: f64,
    pub median_latency_us: u64,
    pub p99_latency_us: u64,
}

impl MetricsReport {
    /// Ratio of accepted requests (0.0-1.0).
    pub fn allowed_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.accepted as f64 / self.total_requests as f64
        }
    }
}

impl std::fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Attack Metrics Report ===")?;
        writeln!(f, "Duration:           {} ms", self.duration_ms)?;
        writeln!(f, "Total Requests:     {}", self.total_requests)?;
        writeln!(f, "Bytes Inspected:    {}", self.bytes_inspected)?;
        writeln!(f)?;
        writeln!(f, "--- Outcomes ---")?;
        writeln!(f, "Accepted:           {} ({:.1}%)",
            self.accepted,
            self.allowed_ratio() * 100.0)?;
        writeln!(f, "Directive Overflow: {}", self.directive_overflow)?;
        writeln!(f, "Depth Exceeded:     {}", self.depth_exceeded)?;
        writeln!(f, "Unbalanced Braces:  {}", self.unbalanced_braces)?;
        writeln!(f, "Block Rate:         {:.1}%", self.block_rate * 100.0)?;
        writeln!(f)?;
        writeln!(f, "--- Latency ---")?;
        writeln!(f, "Median:             {} us", self.median_latency_us)?;
        writeln!(f, "P99:                {} us", self.p99_latency_us)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        let mut metrics = AttackMetrics::new();
        metrics.start();

        metrics.record(Outcome::Accepted, 10, Duration::from_micros(100));
        metrics.record(Outcome::Accepted, 20, Duration::from_micros(150));
        metrics.record(Outcome::DepthExceeded, 30, Duration::from_micros(50));

        metrics.finish();

        assert_eq!(metrics.total_requests(), 3);
        assert_eq!(metrics.count(Outcome::Accepted), 2);
        assert_eq!(metrics.count(Outcome::DepthExceeded), 1);
        assert_eq!(metrics.report().bytes_inspected, 60);
    }

    #[test]
    fn test_block_rate() {
        let mut metrics = AttackMetrics::new();
        for _ in 0..3 {
            metrics.record(Outcome::Accepted, 0, Duration::ZERO);
        }
        for _ in 0..7 {
            metrics.record(Outcome::UnbalancedBraces, 0, Duration::ZERO);
        }

        assert!((metrics.block_rate() - 0.7).abs() < 0.01);
    }
}
