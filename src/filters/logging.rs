//! Access-logging filter.
//!
//! Outermost filter: records method and URI before anything else runs, and
//! the final status after everything else (including the CORS local
//! override) has had its say. Pure observer; never touches the exchange.

use std::time::Instant;

use async_trait::async_trait;
use axum::http::StatusCode;
use tracing::{error, info, warn};

use crate::error::GatewayResult;
use crate::metrics;
use crate::pipeline::{Exchange, Filter, FilterOrder, Next, Outcome};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFilter;

impl LoggingFilter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Filter for LoggingFilter {
    fn name(&self) -> &str {
        "access-log"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::LOGGING
    }

    async fn filter(&self, exchange: &mut Exchange, next: Next<'_>) -> GatewayResult<Outcome> {
        let started = Instant::now();
        info!(
            request_id = exchange.request_id(),
            method = %exchange.method(),
            uri = %exchange.uri(),
            "→ inbound request"
        );

        let result = next.run(exchange).await;
        let elapsed = started.elapsed();
        let route = exchange.route_id().unwrap_or("unrouted");

        // On failure, report the status the engine is about to synthesize.
        let status = match &result {
            Ok(_) => exchange.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Err(_) if exchange.is_committed() => {
                exchange.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Err(err) => err.status_code(),
        };

        match &result {
            Err(err) => warn!(
                request_id = exchange.request_id(),
                route,
                status = status.as_u16(),
                latency_ms = elapsed.as_millis() as u64,
                error = %err,
                "← request failed"
            ),
            Ok(_) if status.is_server_error() => error!(
                request_id = exchange.request_id(),
                route,
                status = status.as_u16(),
                latency_ms = elapsed.as_millis() as u64,
                "← upstream error response"
            ),
            Ok(_) => info!(
                request_id = exchange.request_id(),
                route,
                status = status.as_u16(),
                latency_ms = elapsed.as_millis() as u64,
                "← outbound response"
            ),
        }

        metrics::record_request(route, exchange.method().as_str(), status.as_u16(), elapsed);
        result
    }
}
