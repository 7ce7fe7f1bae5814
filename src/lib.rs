//! # Edge Gateway
//!
//! An HTTP edge gateway that runs every request through an ordered filter
//! pipeline before proxying it to an upstream service:
//!
//! - **CORS**: permissive headers on every response, preflight answered at
//!   the edge, trusted-local callers never see a 403 or a failure
//! - **Access logging**: one structured line in, one out, with the final status
//! - **Bearer authentication**: HMAC-signed tokens, subject forwarded as
//!   `X-Username`
//! - **Resilience**: per-route circuit breakers and named fallback payloads
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Axum catch-all handler (+ Request ID)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RouteTable → FilterChain (access log → CORS → auth)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Downstream (HttpDispatcher + CircuitBreaker | LocalTarget) │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Upstream services (user, order, payment, notification)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edge_gateway::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let addr = config.server_addr();
//!     let app = build_router(AppState::new(config)?);
//!
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Writing a filter
//!
//! ```rust,ignore
//! #[async_trait]
//! impl Filter for Stamp {
//!     fn name(&self) -> &str { "stamp" }
//!     fn order(&self) -> FilterOrder { FilterOrder(10) }
//!
//!     async fn filter(&self, exchange: &mut Exchange, next: Next<'_>) -> GatewayResult<Outcome> {
//!         let outcome = next.run(exchange).await?;
//!         if !exchange.is_committed() {
//!             exchange.set_response_header(HeaderName::from_static("x-stamp"), HeaderValue::from_static("1"))?;
//!         }
//!         Ok(outcome)
//!     }
//! }
//! ```

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fallback;
pub mod filters;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod server;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use error::{DispatchFailure, GatewayError, GatewayResult};
pub use pipeline::{Downstream, Exchange, Filter, FilterChain, FilterOrder, Next, Outcome};
pub use server::build_router;
pub use state::AppState;
