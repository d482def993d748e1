//! Prometheus metrics
//!
//! Counters for webhook outcomes, mutations and external-call failures, plus a
//! histogram of coordinator sync latency. Exposed on `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Counter: webhook requests by provider and outcome
    pub static ref WEBHOOK_EVENTS: CounterVec = register_counter_vec!(
        "issuesync_webhook_events_total",
        "Webhook requests by provider and outcome",
        &["provider", "outcome"]
    )
    .expect("Failed to create webhook_events metric");

    /// Counter: committed issue mutations by action
    pub static ref MUTATIONS: CounterVec = register_counter_vec!(
        "issuesync_mutations_total",
        "Committed issue mutations by action",
        &["action"]
    )
    .expect("Failed to create mutations metric");

    /// Counter: failed external calls and best-effort follow-ups
    pub static ref EXTERNAL_FAILURES: CounterVec = register_counter_vec!(
        "issuesync_external_failures_total",
        "Failed external calls by operation",
        &["operation"]
    )
    .expect("Failed to create external_failures metric");

    /// Counter: retries of transient external failures
    pub static ref EXTERNAL_RETRIES: CounterVec = register_counter_vec!(
        "issuesync_external_retries_total",
        "Retried external calls by operation",
        &["operation"]
    )
    .expect("Failed to create external_retries metric");

    /// Histogram: coordinator sync duration by provider (seconds)
    pub static ref SYNC_DURATION: HistogramVec = register_histogram_vec!(
        "issuesync_sync_duration_seconds",
        "Duration of outbound sync operations",
        &["provider", "status"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to create sync_duration metric");
}

pub fn record_webhook(provider: &str, outcome: &str) {
    WEBHOOK_EVENTS.with_label_values(&[provider, outcome]).inc();
}

pub fn record_mutation(action: &str) {
    MUTATIONS.with_label_values(&[action]).inc();
}

pub fn record_external_failure(operation: &str) {
    EXTERNAL_FAILURES.with_label_values(&[operation]).inc();
}

pub fn record_external_retry(operation: &str) {
    EXTERNAL_RETRIES.with_label_values(&[operation]).inc();
}

pub fn record_sync_duration(provider: &str, status: &str, duration_secs: f64) {
    SYNC_DURATION
        .with_label_values(&[provider, status])
        .observe(duration_secs);
}

/// Encode all registered metrics in the Prometheus text format
pub fn encode_metrics() -> crate::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| crate::SyncError::Other(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::SyncError::Other(format!("Metrics are not UTF-8: {}", e)))
}
