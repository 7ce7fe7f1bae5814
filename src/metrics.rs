//! Prometheus metrics for gateway observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default port 9090),
//! separate from the proxied traffic.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `gateway_requests_total` - Requests by final status (labels: route, method, status)
//! - `gateway_auth_rejections_total` - Requests answered with 401 (label: reason)
//! - `gateway_local_overrides_total` - Trusted-local responses rewritten to 200 (label: kind)
//! - `gateway_circuit_breaker_opens_total` - Times a route's breaker opened (label: route)
//! - `gateway_circuit_breaker_rejections_total` - Dispatches refused by an open breaker (label: route)
//!
//! ## Histograms
//! - `gateway_request_duration_seconds` - End-to-end request latency (label: route)
//!
//! ## Gauges
//! - `gateway_circuit_breaker_state` - Breaker state per route (0 = closed, 1 = half-open, 2 = open)
//!
//! Recording functions are no-ops until [`init_metrics`] installs a recorder,
//! so filters and tests can call them unconditionally.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
    pub const REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
    pub const AUTH_REJECTIONS_TOTAL: &str = "gateway_auth_rejections_total";
    pub const LOCAL_OVERRIDES_TOTAL: &str = "gateway_local_overrides_total";
    pub const CIRCUIT_BREAKER_OPENS_TOTAL: &str = "gateway_circuit_breaker_opens_total";
    pub const CIRCUIT_BREAKER_REJECTIONS_TOTAL: &str = "gateway_circuit_breaker_rejections_total";
    pub const CIRCUIT_BREAKER_STATE: &str = "gateway_circuit_breaker_state";
}

/// Install the Prometheus exporter and describe all metrics.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_TOTAL,
        "Total number of requests handled, by final status"
    );
    describe_counter!(
        names::AUTH_REJECTIONS_TOTAL,
        "Total number of requests rejected by bearer authentication"
    );
    describe_counter!(
        names::LOCAL_OVERRIDES_TOTAL,
        "Total number of trusted-local responses rewritten to 200"
    );
    describe_counter!(
        names::CIRCUIT_BREAKER_OPENS_TOTAL,
        "Total number of times a route's circuit breaker opened"
    );
    describe_counter!(
        names::CIRCUIT_BREAKER_REJECTIONS_TOTAL,
        "Total number of dispatches rejected by an open circuit breaker"
    );

    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "End-to-end request duration in seconds"
    );

    describe_gauge!(
        names::CIRCUIT_BREAKER_STATE,
        "Circuit breaker state (0 = closed, 1 = half-open, 2 = open)"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Request metrics
// =============================================================================

/// Record a finished request with its final status and latency.
pub fn record_request(route: &str, method: &str, status: u16, elapsed: Duration) {
    counter!(
        names::REQUESTS_TOTAL,
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(names::REQUEST_DURATION_SECONDS, "route" => route.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_auth_rejection(reason: &'static str) {
    counter!(names::AUTH_REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

/// `kind` is `"forbidden"` for a rewritten 403, `"failure"` for a swallowed error.
pub fn record_local_override(kind: &'static str) {
    counter!(names::LOCAL_OVERRIDES_TOTAL, "kind" => kind).increment(1);
}

// =============================================================================
// Circuit breaker metrics
// =============================================================================

pub fn record_circuit_breaker_open(route: &str) {
    counter!(names::CIRCUIT_BREAKER_OPENS_TOTAL, "route" => route.to_string()).increment(1);
}

pub fn record_circuit_breaker_rejection(route: &str) {
    counter!(names::CIRCUIT_BREAKER_REJECTIONS_TOTAL, "route" => route.to_string()).increment(1);
}

/// States: 0 = closed, 1 = half-open, 2 = open
pub fn set_circuit_breaker_state(route: &str, state: u8) {
    gauge!(names::CIRCUIT_BREAKER_STATE, "route" => route.to_string()).set(f64::from(state));
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these are no-ops; they must not panic.

    #[test]
    fn test_record_request() {
        record_request("order-service", "GET", 200, Duration::from_millis(12));
        record_request("unrouted", "POST", 404, Duration::ZERO);
    }

    #[test]
    fn test_record_rejections_and_overrides() {
        record_auth_rejection("expired");
        record_local_override("forbidden");
        record_local_override("failure");
    }

    #[test]
    fn test_circuit_breaker_metrics() {
        record_circuit_breaker_open("payment-service");
        record_circuit_breaker_rejection("payment-service");
        set_circuit_breaker_state("payment-service", 0);
        set_circuit_breaker_state("payment-service", 2);
    }
}
