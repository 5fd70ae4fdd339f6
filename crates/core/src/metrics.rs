//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Drain cycles (polls, leases, outcomes, completion reasons)
//! - Deduplication (hits, misses, store failures)
//! - Queue transport (sends, dead-letters)
//! - Stage signaling

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Drain Cycle Metrics
// =============================================================================

/// Drain cycles completed, by stage and completion reason.
pub static DRAIN_CYCLES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("conveyor_drain_cycles_total", "Total drain cycles completed"),
        &["stage", "reason"], // "grace_exhausted", "iteration_cap", "time_cap", "shutdown"
    )
    .unwrap()
});

/// Messages leased from stage queues.
pub static MESSAGES_LEASED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("conveyor_messages_leased_total", "Total messages leased"),
        &["stage"],
    )
    .unwrap()
});

/// Per-message outcomes by status.
pub static MESSAGE_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("conveyor_message_outcomes_total", "Message outcomes"),
        &["stage", "status"], // "created", "duplicate", "skipped", "failed", "poison"
    )
    .unwrap()
});

/// Empty polls observed while waiting out stragglers.
pub static EMPTY_POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("conveyor_empty_polls_total", "Empty lease polls"),
        &["stage"],
    )
    .unwrap()
});

/// Drain cycle duration in seconds.
pub static CYCLE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "conveyor_drain_cycle_duration_seconds",
            "Duration of one full drain cycle",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0]),
        &["stage"],
    )
    .unwrap()
});

/// Handler duration per message in seconds.
pub static HANDLER_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "conveyor_handler_duration_seconds",
            "Per-message handler duration",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 90.0, 120.0]),
        &["stage"],
    )
    .unwrap()
});

/// Visibility lease durations handed to the queue transport.
pub static LEASE_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "conveyor_lease_seconds",
            "Visibility lease durations requested",
        )
        .buckets(vec![30.0, 60.0, 90.0, 120.0, 180.0, 240.0, 300.0]),
        &["stage"],
    )
    .unwrap()
});

// =============================================================================
// Deduplication Metrics
// =============================================================================

/// Deduplication decisions.
pub static DEDUP_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("conveyor_dedup_decisions_total", "Deduplication decisions"),
        &["decision"], // "create", "skip", "overwrite"
    )
    .unwrap()
});

/// Deduplication store failures (lookups or writes).
pub static DEDUP_STORE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "conveyor_dedup_store_failures_total",
            "Deduplication store failures",
        ),
        &["operation"], // "get", "put"
    )
    .unwrap()
});

// =============================================================================
// Queue Metrics
// =============================================================================

/// Messages sent to stage queues.
pub static MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("conveyor_messages_sent_total", "Messages sent to queues"),
        &["queue"],
    )
    .unwrap()
});

/// Messages moved to the dead-letter table.
pub static DEAD_LETTERS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("conveyor_dead_letters_total", "Messages dead-lettered"),
        &["stage", "reason"], // "poison", "retry_budget_exhausted"
    )
    .unwrap()
});

// =============================================================================
// Signal Metrics
// =============================================================================

/// Stage completion signals posted downstream.
pub static SIGNALS_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "conveyor_signals_sent_total",
            "Stage completion signals posted",
        ),
        &["from_stage", "to_stage"],
    )
    .unwrap()
});

/// Signals withheld because no new artifacts were produced.
pub static SIGNALS_SUPPRESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "conveyor_signals_suppressed_total",
            "Completion signals withheld (zero artifacts)",
        ),
        &["stage"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Drain cycle
        Box::new(DRAIN_CYCLES.clone()),
        Box::new(MESSAGES_LEASED.clone()),
        Box::new(MESSAGE_OUTCOMES.clone()),
        Box::new(EMPTY_POLLS.clone()),
        Box::new(CYCLE_DURATION.clone()),
        Box::new(HANDLER_DURATION.clone()),
        Box::new(LEASE_SECONDS.clone()),
        // Dedup
        Box::new(DEDUP_DECISIONS.clone()),
        Box::new(DEDUP_STORE_FAILURES.clone()),
        // Queue
        Box::new(MESSAGES_SENT.clone()),
        Box::new(DEAD_LETTERS.clone()),
        // Signals
        Box::new(SIGNALS_SENT.clone()),
        Box::new(SIGNALS_SUPPRESSED.clone()),
    ]
}
