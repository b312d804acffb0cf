//! Prometheus Metrics Module
//!
//! Pipeline counters, gauges and histograms in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Generation**: ticks generated and published, publish latency
//! - **Consumption**: records consumed per group, malformed records skipped
//! - **Sinks**: durable rows stored, window cache writes
//! - **Fan-out**: broadcast deliveries, dropped and live connections
//! - **Bootstrap**: dependency retry attempts
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, or return the already installed handle.
///
/// # Errors
///
/// Returns `BuildError` if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "tickstream_ticks_generated_total",
        "Ticks produced by the synthetic generator"
    );
    describe_counter!(
        "tickstream_ticks_published_total",
        "Ticks appended to the message log"
    );
    describe_counter!(
        "tickstream_generation_cycles_failed_total",
        "Generation cycles abandoned after a publish error"
    );
    describe_histogram!(
        "tickstream_publish_seconds",
        "Time to append one tick to the message log"
    );

    describe_counter!(
        "tickstream_records_consumed_total",
        "Log records handled per consumer group"
    );
    describe_counter!(
        "tickstream_malformed_records_total",
        "Log records skipped because they failed validation"
    );

    describe_counter!(
        "tickstream_ticks_stored_total",
        "Rows appended to the durable tick table"
    );
    describe_counter!(
        "tickstream_cache_writes_total",
        "Ticks written to the windowed cache"
    );

    describe_counter!(
        "tickstream_broadcast_deliveries_total",
        "Tick frames queued to live connections"
    );
    describe_counter!(
        "tickstream_connections_dropped_total",
        "Live connections removed after a failed send"
    );
    describe_gauge!(
        "tickstream_live_connections",
        "Registered live WebSocket connections"
    );

    describe_counter!(
        "tickstream_bootstrap_retries_total",
        "Retries while waiting for a dependency at startup"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why a live connection was dropped.
#[derive(Debug, Clone, Copy)]
pub enum DropReason {
    /// Connection task already gone.
    Closed,
    /// Outbound buffer full.
    Lagging,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Lagging => "lagging",
        }
    }
}

/// Record ticks produced by one generation cycle.
pub fn record_ticks_generated(count: u64) {
    counter!("tickstream_ticks_generated_total").increment(count);
}

/// Record one tick appended to the log and how long it took.
pub fn record_tick_published(duration: Duration) {
    counter!("tickstream_ticks_published_total").increment(1);
    histogram!("tickstream_publish_seconds").record(duration.as_secs_f64());
}

/// Record a generation cycle abandoned on a publish error.
pub fn record_generation_failed() {
    counter!("tickstream_generation_cycles_failed_total").increment(1);
}

/// Record a record handled by a consumer group.
pub fn record_consumed(group: &str) {
    counter!(
        "tickstream_records_consumed_total",
        "group" => group.to_string()
    )
    .increment(1);
}

/// Record a malformed record skipped by a consumer group.
pub fn record_malformed(group: &str) {
    counter!(
        "tickstream_malformed_records_total",
        "group" => group.to_string()
    )
    .increment(1);
}

/// Record a durable row insert.
pub fn record_tick_stored() {
    counter!("tickstream_ticks_stored_total").increment(1);
}

/// Record a windowed cache write.
pub fn record_cache_write() {
    counter!("tickstream_cache_writes_total").increment(1);
}

/// Record frames queued during one broadcast pass.
pub fn record_broadcast_deliveries(count: u64) {
    counter!("tickstream_broadcast_deliveries_total").increment(count);
}

/// Record a dropped connection.
pub fn record_connection_dropped(reason: DropReason) {
    counter!(
        "tickstream_connections_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Update the live connection gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_live_connections(count: usize) {
    gauge!("tickstream_live_connections").set(count as f64);
}

/// Record a bootstrap retry for a dependency.
pub fn record_bootstrap_retry(dependency: &str) {
    counter!(
        "tickstream_bootstrap_retries_total",
        "dependency" => dependency.to_string()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
