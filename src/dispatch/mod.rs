//! Downstream dispatchers: the terminal stage of every filter chain.
//!
//! - [`HttpDispatcher`]: proxies to a route's upstream behind a per-route
//!   [`CircuitBreaker`]
//! - [`LocalTarget`]: answers built-in endpoints and routing errors

pub mod circuit_breaker;
mod http;
mod local;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use http::HttpDispatcher;
pub use local::LocalTarget;
