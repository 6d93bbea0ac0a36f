//! Prometheus metrics for the bot loop and market requests.
//!
//! This module provides:
//! - Per-endpoint HTTP request latency
//! - Loop iteration latency
//! - Counters for registrations, ledger fetches and stock requests

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{debug, warn};

// === Metric Name Constants ===

/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// Loop iteration latency metric name.
pub const METRIC_ITERATION_LATENCY: &str = "iteration_latency_ms";
/// Registrations counter metric name.
pub const METRIC_REGISTRATIONS: &str = "vendor_registrations_total";
/// Ledger fetches counter metric name.
pub const METRIC_LEDGER_FETCHES: &str = "ledger_fetches_total";
/// Accepted stock requests counter metric name.
pub const METRIC_STOCK_REQUESTS: &str = "stock_requests_total";
/// Rejected stock requests counter metric name.
pub const METRIC_STOCK_REJECTIONS: &str = "stock_rejections_total";
/// Skipped iterations counter metric name.
pub const METRIC_SKIPPED_ITERATIONS: &str = "skipped_iterations_total";
/// Purchases counter metric name.
pub const METRIC_PURCHASES: &str = "purchases_total";

/// Initialize all metric descriptions.
/// Call this once at startup, after installing a recorder.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "CodeMarket request latency in milliseconds"
    );
    describe_histogram!(
        METRIC_ITERATION_LATENCY,
        "Bot loop iteration latency in milliseconds"
    );

    describe_counter!(METRIC_REGISTRATIONS, "Total number of vendor registrations");
    describe_counter!(METRIC_LEDGER_FETCHES, "Total number of ledger fetches");
    describe_counter!(
        METRIC_STOCK_REQUESTS,
        "Total number of stock requests accepted"
    );
    describe_counter!(
        METRIC_STOCK_REJECTIONS,
        "Total number of stock requests rejected by the market"
    );
    describe_counter!(
        METRIC_SKIPPED_ITERATIONS,
        "Total number of iterations with an empty store"
    );
    describe_counter!(METRIC_PURCHASES, "Total number of purchases");

    debug!("Metrics initialized");
}

/// Install the Prometheus recorder and return a handle for rendering.
///
/// Returns `None` if a global recorder is already installed.
pub fn install_prometheus() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            init_metrics();
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

/// Record HTTP request latency.
pub fn record_http_latency(start: Instant, endpoint: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "endpoint" => endpoint.to_string()).record(latency_ms);
}

/// Increment registrations counter.
pub fn inc_registrations() {
    counter!(METRIC_REGISTRATIONS).increment(1);
}

/// Increment ledger fetches counter.
pub fn inc_ledger_fetches() {
    counter!(METRIC_LEDGER_FETCHES).increment(1);
}

/// Increment accepted stock requests counter.
pub fn inc_stock_requests() {
    counter!(METRIC_STOCK_REQUESTS).increment(1);
}

/// Increment rejected stock requests counter.
pub fn inc_stock_rejections() {
    counter!(METRIC_STOCK_REJECTIONS).increment(1);
}

/// Increment skipped iterations counter.
pub fn inc_skipped_iterations() {
    counter!(METRIC_SKIPPED_ITERATIONS).increment(1);
}

/// Increment purchases counter.
pub fn inc_purchases() {
    counter!(METRIC_PURCHASES).increment(1);
}

/// RAII guard for timing operations.
/// Records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Elapsed time in milliseconds, without recording.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

/// Create a latency timer for one loop iteration.
pub fn timer_iteration() -> LatencyTimer {
    LatencyTimer::new(METRIC_ITERATION_LATENCY)
}
