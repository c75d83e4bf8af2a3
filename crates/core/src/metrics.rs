//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Export jobs (submissions, completions, failures, retries)
//! - Pipeline phases (capture, encode, mux, upload)
//! - External services (presentation API, billing API)

use once_cell::sync::Lazy;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
};

// =============================================================================
// Job lifecycle metrics
// =============================================================================

/// Export jobs submitted total.
pub static JOBS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("slidecast_jobs_submitted_total", "Total export jobs submitted").unwrap()
});

/// Export jobs finished total by outcome.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("slidecast_jobs_finished_total", "Total export jobs finished"),
        &["outcome"], // "completed", "failed", "cancelled"
    )
    .unwrap()
});

/// Export job failures by stable error class.
pub static JOB_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("slidecast_job_failures_total", "Total export job failures"),
        &["class"], // "render_failure", "timing_mismatch", ...
    )
    .unwrap()
});

/// Retry jobs scheduled total.
pub static RETRIES_SCHEDULED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "slidecast_retries_scheduled_total",
        "Total retry jobs scheduled",
    )
    .unwrap()
});

/// Stale jobs reaped total.
pub static JOBS_REAPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "slidecast_jobs_reaped_total",
        "Total stale jobs reaped by the watchdog",
    )
    .unwrap()
});

/// Jobs currently being processed.
pub static JOBS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "slidecast_jobs_in_flight",
        "Export jobs currently being processed",
    )
    .unwrap()
});

/// End-to-end export duration in seconds.
pub static EXPORT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "slidecast_export_duration_seconds",
            "End-to-end duration of export jobs",
        )
        .buckets(vec![5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Output metrics
// =============================================================================

/// Slides rendered per export.
pub static SLIDES_RENDERED: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "slidecast_slides_rendered",
            "Number of slides rendered per export",
        )
        .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        &[],
    )
    .unwrap()
});

/// Output video size in bytes.
pub static OUTPUT_SIZE_BYTES: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "slidecast_output_size_bytes",
            "Size of finished export files",
        )
        .buckets(vec![
            1e6, 5e6, 1e7, 5e7, 1e8, 5e8, 1e9, 5e9,
        ]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// External service metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "slidecast_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "slidecast_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOB_FAILURES.clone()),
        Box::new(RETRIES_SCHEDULED.clone()),
        Box::new(JOBS_REAPED.clone()),
        Box::new(JOBS_IN_FLIGHT.clone()),
        Box::new(EXPORT_DURATION.clone()),
        Box::new(SLIDES_RENDERED.clone()),
        Box::new(OUTPUT_SIZE_BYTES.clone()),
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}
