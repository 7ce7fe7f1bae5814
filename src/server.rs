//! HTTP surface: one catch-all handler feeding the filter pipeline.
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Catch panic    │ ← 500 JSON for panics outside the filter chain
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← X-Request-Id on request, response and span
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Gateway      │ ← route → filter chain → downstream
//! └──────────────────┘
//! ```

use std::any::Any;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_TYPE, HeaderValue};
use axum::http::StatusCode;
use axum::response::Response;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info};

use crate::dispatch::LocalTarget;
use crate::error::GatewayError;
use crate::middleware::{RequestIdLayer, request_id};
use crate::pipeline::Exchange;
use crate::pipeline::engine::panic_message;
use crate::state::AppState;

/// Build the gateway router.
pub fn build_router(state: AppState) -> Router {
    info!(
        routes = state.routes.len(),
        max_body_mb = state.config.max_request_body_size / (1024 * 1024),
        "Gateway router configured"
    );

    Router::new()
        .fallback(gateway)
        .with_state(state)
        .layer(RequestIdLayer::new())
        .layer(CatchPanicLayer::custom(panic_response))
}

/// Run one request through the pipeline.
///
/// The body is buffered (up to `max_request_body_size`) so filters and the
/// dispatcher see it as plain bytes.
async fn gateway(State(state): State<AppState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let (body, too_large) = match to_bytes(body, state.config.max_request_body_size).await {
        Ok(bytes) => (bytes, false),
        Err(_) => (bytes::Bytes::new(), true),
    };

    let selected = if too_large {
        state.local(LocalTarget::PayloadTooLarge)
    } else {
        state.select(&parts.method, parts.uri.path())
    };

    let mut exchange = Exchange::new(parts.method, parts.uri, parts.headers, body)
        .with_route(selected.route_id);
    if let Some(id) = request_id(exchange.request_headers()).map(str::to_string) {
        exchange = exchange.with_request_id(id);
    }

    selected.chain.run(&mut exchange, selected.downstream).await;
    exchange.into_response()
}

/// Last resort for panics the filter chain engine did not see.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic_message(&*err);
    error!(panic = detail, "Request handler panicked");

    let failure = GatewayError::Internal(detail.to_string());
    let mut response = Response::new(Body::from(failure.body()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
