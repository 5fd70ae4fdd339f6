//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the conveyor server:
//! - HTTP request metrics (latency, counts, errors)
//! - Queue depth and worker status (collected dynamically)
//! - Deduplication index size (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "conveyor_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("conveyor_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "conveyor_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "conveyor_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics (collected dynamically)
// =============================================================================

/// Queue depth per stage.
pub static QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("conveyor_queue_depth", "Messages currently on each stage queue"),
        &["stage"],
    )
    .unwrap()
});

/// Worker running state per stage (1 = running, 0 = stopped).
pub static WORKER_RUNNING: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "conveyor_worker_running",
            "Whether each stage worker is running (1) or stopped (0)",
        ),
        &["stage"],
    )
    .unwrap()
});

/// Number of recorded content fingerprints.
pub static DEDUP_RECORDS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "conveyor_dedup_records",
        "Number of fingerprints in the deduplication index",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // Pipeline
    registry.register(Box::new(QUEUE_DEPTH.clone())).unwrap();
    registry
        .register(Box::new(WORKER_RUNNING.clone()))
        .unwrap();
    registry.register(Box::new(DEDUP_RECORDS.clone())).unwrap();

    // Core metrics (drain cycles, dedup decisions, signals)
    for metric in conveyor_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the live queue depths,
/// worker states and dedup index size.
pub async fn collect_dynamic_metrics(state: &AppState) {
    for worker in state.workers() {
        let status = worker.status().await;
        WORKER_RUNNING
            .with_label_values(&[&status.stage])
            .set(if status.running { 1 } else { 0 });

        if let Ok(depth) = state.queue().depth(worker.stage().queue_name()).await {
            QUEUE_DEPTH
                .with_label_values(&[&status.stage])
                .set(depth as i64);
        }
    }

    if let Ok(count) = state.dedup_records().count() {
        DEDUP_RECORDS.set(count as i64);
    }
}

/// Collect dynamic metrics, then encode. Handler for `GET /metrics`.
pub async fn encode_metrics_for(state: &AppState) -> String {
    collect_dynamic_metrics(state).await;
    encode_metrics()
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let hash_regex = regex_lite::Regex::new(r"[0-9a-fA-F]{40,64}").unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = hash_regex.replace_all(&result, "{hash}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}
