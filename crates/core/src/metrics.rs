//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Runs (results, duration, billed units, auth failovers)
//! - Transfers (files, bytes, retries)
//! - Ephemeral storage (container deletions, sweeps)
//! - Translation engine (requests, latency)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Run Metrics
// =============================================================================

/// Runs total by result.
pub static RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("doctr_runs_total", "Total translation runs"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Run duration in seconds.
pub static RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("doctr_run_duration_seconds", "Duration of translation runs")
            .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]),
        &["result"],
    )
    .unwrap()
});

/// Billed characters/units reported by the engine.
pub static BILLED_UNITS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("doctr_billed_units_total", "Total billed translation units").unwrap()
});

/// Resubmissions with direct identity after a signed URI rejection.
pub static AUTH_FAILOVERS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "doctr_auth_failovers_total",
        "Total failovers from signed URI to direct identity access",
    )
    .unwrap()
});

/// Status polls issued.
pub static STATUS_POLLS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("doctr_status_polls_total", "Total job status polls").unwrap()
});

// =============================================================================
// Transfer Metrics
// =============================================================================

/// Files transferred by direction.
pub static FILES_TRANSFERRED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("doctr_files_transferred_total", "Total files transferred"),
        &["direction"], // "upload", "download"
    )
    .unwrap()
});

/// Bytes transferred by direction.
pub static BYTES_TRANSFERRED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("doctr_bytes_transferred_total", "Total bytes transferred"),
        &["direction"],
    )
    .unwrap()
});

/// Transfer retry attempts by direction.
pub static TRANSFER_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("doctr_transfer_retries_total", "Total transfer retry attempts"),
        &["direction"],
    )
    .unwrap()
});

// =============================================================================
// Ephemeral Storage Metrics
// =============================================================================

/// Run container deletions by result.
pub static CONTAINERS_DELETED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "doctr_containers_deleted_total",
            "Total run container deletions",
        ),
        &["result"], // "deleted", "failed"
    )
    .unwrap()
});

/// Abandoned containers removed by the sweeper.
pub static CONTAINERS_SWEPT: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "doctr_containers_swept_total",
        "Total abandoned containers swept",
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics
// =============================================================================

/// Engine request duration.
pub static ENGINE_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "doctr_engine_request_duration_seconds",
            "Duration of translation engine calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"],
    )
    .unwrap()
});

/// Engine requests total.
pub static ENGINE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "doctr_engine_requests_total",
            "Total translation engine requests",
        ),
        &["operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Runs
        Box::new(RUNS_TOTAL.clone()),
        Box::new(RUN_DURATION.clone()),
        Box::new(BILLED_UNITS.clone()),
        Box::new(AUTH_FAILOVERS.clone()),
        Box::new(STATUS_POLLS.clone()),
        // Transfers
        Box::new(FILES_TRANSFERRED.clone()),
        Box::new(BYTES_TRANSFERRED.clone()),
        Box::new(TRANSFER_RETRIES.clone()),
        // Storage
        Box::new(CONTAINERS_DELETED.clone()),
        Box::new(CONTAINERS_SWEPT.clone()),
        // Engine
        Box::new(ENGINE_REQUEST_DURATION.clone()),
        Box::new(ENGINE_REQUESTS.clone()),
    ]
}
