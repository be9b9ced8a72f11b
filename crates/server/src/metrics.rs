// crates/server/src/metrics.rs
//! Prometheus recorder for the server.
//!
//! Counters and gauges are recorded in `taskstream-core` through the
//! `metrics` facade; this module installs the exporter and renders it.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Call once at startup, before any metrics are recorded.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!(
        "taskstream_tasks_submitted_total",
        "Tasks accepted by this instance"
    );
    describe_counter!(
        "taskstream_events_published_total",
        "Lifecycle events published to the bus, by status"
    );
    describe_counter!(
        "taskstream_publish_failures_total",
        "Bus publishes that failed and were dropped"
    );
    describe_counter!(
        "taskstream_events_delivered_total",
        "Events pushed to a local stream, by status"
    );
    describe_counter!("taskstream_sessions_opened_total", "Streams opened");
    describe_counter!(
        "taskstream_sessions_closed_total",
        "Streams closed, by reason"
    );
    describe_gauge!("taskstream_sessions_active", "Streams currently open");
    describe_gauge!("taskstream_uptime_seconds", "Seconds since this instance started");
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}
