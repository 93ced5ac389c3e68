//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ThesisForge metrics
pub const METRICS_PREFIX: &str = "thesisforge";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 25ms, P99 < 100ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms - P50 target
    0.050,  // 50ms
    0.100,  // 100ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Authorization metrics
    describe_counter!(
        format!("{}_authz_decisions_total", METRICS_PREFIX),
        Unit::Count,
        "Authorization decisions by action and outcome"
    );

    // Workflow metrics
    describe_counter!(
        format!("{}_status_transitions_total", METRICS_PREFIX),
        Unit::Count,
        "Applied document status transitions"
    );

    describe_counter!(
        format!("{}_collaborator_changes_total", METRICS_PREFIX),
        Unit::Count,
        "Collaborator registry mutations by kind"
    );

    describe_counter!(
        format!("{}_migration_backfilled_total", METRICS_PREFIX),
        Unit::Count,
        "Primary collaborators synthesized from legacy fields"
    );

    // Presence metrics
    describe_gauge!(
        format!("{}_presence_active_users", METRICS_PREFIX),
        Unit::Count,
        "Users currently present across all documents"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record an authorization decision
pub fn record_authz(action: &str, allowed: bool) {
    let outcome = if allowed { "granted" } else { "denied" };

    counter!(
        format!("{}_authz_decisions_total", METRICS_PREFIX),
        "action" => action.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Helper to record an applied status transition
pub fn record_transition(from: &str, to: &str) {
    counter!(
        format!("{}_status_transitions_total", METRICS_PREFIX),
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

/// Helper to record a registry mutation
pub fn record_collaborator_change(kind: &str) {
    counter!(
        format!("{}_collaborator_changes_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Helper to record migration output
pub fn record_migration(students: usize, advisors: usize) {
    counter!(
        format!("{}_migration_backfilled_total", METRICS_PREFIX),
        "family" => "student"
    )
    .increment(students as u64);

    counter!(
        format!("{}_migration_backfilled_total", METRICS_PREFIX),
        "family" => "advisor"
    )
    .increment(advisors as u64);
}

/// Helper to publish the presence gauge
pub fn record_presence(active_users: usize) {
    gauge!(format!("{}_presence_active_users", METRICS_PREFIX)).set(active_users as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        // Verify buckets are sorted and contain SLO targets
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }

        assert!(LATENCY_BUCKETS.contains(&0.025));
        assert!(LATENCY_BUCKETS.contains(&0.100));
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("POST", "/v1/documents");
        std::thread::sleep(std::time::Duration::from_millis(5));
        metrics.finish(201);
        // Just verify it runs without panic
    }

    #[test]
    fn test_helpers_without_recorder() {
        record_authz("edit_document", false);
        record_transition("DRAFT", "SUBMITTED");
        record_collaborator_change("added");
        record_migration(1, 0);
        record_presence(3);
    }
}
