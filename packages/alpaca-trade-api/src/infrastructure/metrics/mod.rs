//! Client Metrics
//!
//! Records through the `metrics` facade only. Applications that want the
//! numbers install a recorder (Prometheus, statsd, ...) and may call
//! [`describe_metrics`] once to attach help text; without a recorder every
//! call here is a no-op.
//!
//! # Metrics Categories
//!
//! - **Streams**: frames received, state transitions, reconnects, errors
//! - **Observers**: callbacks that panicked
//! - **REST**: requests by method and status, latency

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Attach descriptions to every metric this crate emits.
pub fn describe_metrics() {
    describe_counter!(
        "alpaca_stream_frames_received_total",
        "Total frames received on a streaming connection"
    );
    describe_counter!(
        "alpaca_stream_state_transitions_total",
        "Connection state transitions by target state"
    );
    describe_counter!(
        "alpaca_stream_reconnects_total",
        "Total scheduled reconnection attempts"
    );
    describe_counter!(
        "alpaca_stream_errors_total",
        "Stream errors by type"
    );
    describe_counter!(
        "alpaca_observer_panics_total",
        "Observer callbacks that panicked during dispatch"
    );
    describe_counter!(
        "alpaca_http_requests_total",
        "REST requests by method and status"
    );
    describe_histogram!(
        "alpaca_http_request_seconds",
        "REST request latency"
    );
}

/// Metric label for the two streaming endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// `MessagePack` market data stream.
    MarketData,
    /// JSON trading stream.
    Trading,
}

impl StreamKind {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MarketData => "market_data",
            Self::Trading => "trading",
        }
    }
}

/// Record a frame received on a stream.
pub fn record_frame_received(stream: StreamKind) {
    counter!(
        "alpaca_stream_frames_received_total",
        "stream" => stream.as_str()
    )
    .increment(1);
}

/// Record a connection state transition.
pub fn record_state_transition(stream: StreamKind, state: &'static str) {
    counter!(
        "alpaca_stream_state_transitions_total",
        "stream" => stream.as_str(),
        "state" => state
    )
    .increment(1);
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect(stream: StreamKind) {
    counter!(
        "alpaca_stream_reconnects_total",
        "stream" => stream.as_str()
    )
    .increment(1);
}

/// Record a stream error.
pub fn record_stream_error(stream: StreamKind, error_type: &'static str) {
    counter!(
        "alpaca_stream_errors_total",
        "stream" => stream.as_str(),
        "error_type" => error_type
    )
    .increment(1);
}

/// Record an observer that panicked.
pub fn record_observer_panic(event: &'static str) {
    counter!("alpaca_observer_panics_total", "event" => event).increment(1);
}

/// Record a finished REST request.
pub fn record_http_request(method: &str, status: u16, duration: Duration) {
    counter!(
        "alpaca_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("alpaca_http_request_seconds", "method" => method.to_string())
        .record(duration.as_secs_f64());
}
