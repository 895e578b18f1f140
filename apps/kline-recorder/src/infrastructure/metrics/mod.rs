//! Prometheus Metrics Module
//!
//! Exposes recorder metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Ingestion**: frames received and what became of them
//! - **Connection**: feed connection state and reconnects
//! - **Upstream**: historical fetches and their latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP API port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::services::IngestOutcome;
use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
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
    // Ingestion counters
    describe_counter!(
        "kline_recorder_frames_received_total",
        "Total text frames received from the kline stream"
    );
    describe_counter!(
        "kline_recorder_observations_stored_total",
        "Total observations appended to the store"
    );
    describe_counter!(
        "kline_recorder_updates_throttled_total",
        "Total updates dropped by the per-symbol throttle"
    );
    describe_counter!(
        "kline_recorder_decode_failures_total",
        "Total frames that could not be decoded"
    );
    describe_counter!(
        "kline_recorder_store_failures_total",
        "Total admitted updates whose append failed"
    );

    // Connection
    describe_gauge!(
        "kline_recorder_connection_state",
        "Feed connection state (0=disconnected 1=connecting 2=connected 3=closing 4=terminated)"
    );
    describe_counter!(
        "kline_recorder_reconnects_total",
        "Total stream reconnection attempts"
    );
    describe_counter!(
        "kline_recorder_stream_errors_total",
        "Total stream session failures by type"
    );

    // Upstream
    describe_counter!(
        "kline_recorder_upstream_fetches_total",
        "Total upstream history fetches by outcome"
    );
    describe_histogram!(
        "kline_recorder_upstream_fetch_seconds",
        "Upstream history fetch latency"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for upstream fetches.
#[derive(Debug, Clone, Copy)]
pub enum FetchOutcome {
    /// Fetch returned bars.
    Success,
    /// Fetch failed.
    Failure,
}

impl FetchOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Record a text frame received from the stream.
pub fn record_frame_received() {
    counter!("kline_recorder_frames_received_total").increment(1);
}

/// Record what the ingestion pipeline did with a frame.
pub fn record_ingest_outcome(outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::Stored(symbol) => counter!(
            "kline_recorder_observations_stored_total",
            "symbol" => symbol.to_string()
        )
        .increment(1),
        IngestOutcome::Throttled(symbol) => counter!(
            "kline_recorder_updates_throttled_total",
            "symbol" => symbol.to_string()
        )
        .increment(1),
        IngestOutcome::DecodeFailed => {
            counter!("kline_recorder_decode_failures_total").increment(1);
        }
        IngestOutcome::StoreFailed(symbol) => counter!(
            "kline_recorder_store_failures_total",
            "symbol" => symbol.to_string()
        )
        .increment(1),
    }
}

/// Publish the feed connection state.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("kline_recorder_connection_state").set(f64::from(state.code()));
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("kline_recorder_reconnects_total").increment(1);
}

/// Record a stream session failure.
pub fn record_stream_error(error_type: &'static str) {
    counter!(
        "kline_recorder_stream_errors_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Record an upstream fetch and its duration.
pub fn record_upstream_fetch(outcome: FetchOutcome, duration: Duration) {
    counter!(
        "kline_recorder_upstream_fetches_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!("kline_recorder_upstream_fetch_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
