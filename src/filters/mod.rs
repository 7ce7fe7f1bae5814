//! Gateway filters.
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Access log     │ ← method/URI in, final status out
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← headers on every response, 200 for OPTIONS,
//! └────────┬─────────┘   local override on the way out
//!          ▼
//! ┌──────────────────┐
//! │  Bearer auth     │ ← 401 if invalid (protected routes only)
//! └────────┬─────────┘
//!          ▼
//!      Downstream
//! ```

pub mod auth;
pub mod cors;
pub mod logging;

use std::sync::Arc;

pub use auth::{AuthenticationFilter, BEARER_PREFIX, USERNAME_HEADER};
pub use cors::{ALLOWED_METHODS, CorsFilter};
pub use logging::LoggingFilter;

use async_trait::async_trait;
use axum::http::StatusCode;
use tracing::warn;

use crate::auth::TokenValidator;
use crate::error::GatewayResult;
use crate::pipeline::{Exchange, Filter, FilterChain, FilterOrder, Next, Outcome};

/// Chains used by the gateway: one for public routes, one for routes that
/// require authentication.
#[derive(Clone)]
pub struct Chains {
    pub public: FilterChain,
    pub protected: FilterChain,
}

impl Chains {
    /// Build both chains from the shared filters.
    ///
    /// `validator` is `None` when no route needs authentication; the
    /// protected chain then rejects everything instead of letting requests
    /// through unauthenticated.
    pub fn new(cors: CorsFilter, validator: Option<Arc<TokenValidator>>) -> Self {
        let logging: Arc<dyn Filter> = Arc::new(LoggingFilter::new());
        let cors: Arc<dyn Filter> = Arc::new(cors);

        let public = FilterChain::new(vec![logging.clone(), cors.clone()]);

        let mut protected: Vec<Arc<dyn Filter>> = vec![logging, cors];
        match validator {
            Some(validator) => protected.push(Arc::new(AuthenticationFilter::new(validator))),
            None => protected.push(Arc::new(DenyAll)),
        }

        Self {
            public,
            protected: FilterChain::new(protected),
        }
    }

    pub fn for_route(&self, auth_required: bool) -> &FilterChain {
        if auth_required {
            &self.protected
        } else {
            &self.public
        }
    }
}

/// Stand-in for the auth filter when no signing secret is configured.
struct DenyAll;

#[async_trait]
impl Filter for DenyAll {
    fn name(&self) -> &str {
        "deny-all"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::AUTH
    }

    async fn filter(&self, exchange: &mut Exchange, _next: Next<'_>) -> GatewayResult<Outcome> {
        warn!(path = %exchange.path(), "No token secret configured, rejecting");
        exchange.short_circuit(StatusCode::UNAUTHORIZED)
    }
}
