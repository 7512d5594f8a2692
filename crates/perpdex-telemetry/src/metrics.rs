//! Prometheus metrics for the perpdex client.
//!
//! Covers:
//! - Stream frames, decode failures and transport failures per stream kind
//! - Active subscription count
//! - REST request latency per endpoint
//! - Contract invocations per method and outcome
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

/// Stream frames delivered to a callback.
/// Labels: kind (candles/ticker)
pub static STREAM_FRAMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpdex_stream_frames_total",
        "Total stream frames decoded and dispatched",
        &["kind"]
    )
    .unwrap()
});

/// Stream frames dropped because they failed to decode.
pub static STREAM_DECODE_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpdex_stream_decode_errors_total",
        "Total stream frames dropped on decode failure",
        &["kind"]
    )
    .unwrap()
});

/// Stream transport failures (connect, read, server close).
pub static STREAM_TRANSPORT_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpdex_stream_transport_errors_total",
        "Total stream transport failures",
        &["kind"]
    )
    .unwrap()
});

/// Reconnect attempts scheduled after a transport failure.
pub static STREAM_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpdex_stream_reconnect_total",
        "Total stream reconnect attempts",
        &["kind"]
    )
    .unwrap()
});

/// Open subscriptions.
pub static SUBSCRIPTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "perpdex_subscriptions_active",
        "Number of open stream subscriptions"
    )
    .unwrap()
});

/// REST request latency in milliseconds.
/// Labels: endpoint (klines/ticker_24hr), outcome (ok/error)
pub static REST_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "perpdex_rest_latency_ms",
        "REST request latency in milliseconds",
        &["endpoint", "outcome"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 10000.0]
    )
    .unwrap()
});

/// Contract invocations.
/// Labels: method, outcome (ok/retryable/error/invalid)
pub static CONTRACT_INVOCATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpdex_contract_invocations_total",
        "Total contract invocations by method and outcome",
        &["method", "outcome"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a decoded stream frame.
    pub fn stream_frame(kind: &str) {
        STREAM_FRAMES_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record a stream frame dropped on decode failure.
    pub fn stream_decode_error(kind: &str) {
        STREAM_DECODE_ERRORS_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record a stream transport failure.
    pub fn stream_transport_error(kind: &str) {
        STREAM_TRANSPORT_ERRORS_TOTAL
            .with_label_values(&[kind])
            .inc();
    }

    /// Record a scheduled reconnect.
    pub fn stream_reconnect(kind: &str) {
        STREAM_RECONNECT_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn subscription_opened() {
        SUBSCRIPTIONS_ACTIVE.inc();
    }

    pub fn subscription_closed() {
        SUBSCRIPTIONS_ACTIVE.dec();
    }

    /// Current open subscription count.
    pub fn subscriptions_active() -> i64 {
        SUBSCRIPTIONS_ACTIVE.get()
    }

    /// Record REST latency.
    pub fn rest_latency(endpoint: &str, outcome: &str, latency_ms: f64) {
        REST_LATENCY_MS
            .with_label_values(&[endpoint, outcome])
            .observe(latency_ms);
    }

    /// Record a contract invocation outcome.
    pub fn contract_invocation(method: &str, outcome: &str) {
        CONTRACT_INVOCATIONS_TOTAL
            .with_label_values(&[method, outcome])
            .inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
