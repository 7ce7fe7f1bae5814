//! Shared gateway state for the request handler.
//!
//! Everything here is built once at startup and shared read-only across
//! requests via `Arc`. The per-route circuit breakers inside the
//! dispatchers are the only mutable parts, and they synchronize internally.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::auth::TokenValidator;
use crate::config::Config;
use crate::dispatch::{CircuitBreakerConfig, HttpDispatcher, LocalTarget};
use crate::error::{GatewayError, GatewayResult};
use crate::filters::{Chains, CorsFilter};
use crate::pipeline::{Downstream, FilterChain};
use crate::routes::RouteTable;

/// Filter chain, downstream and route label selected for one request.
pub struct Selected<'a> {
    pub chain: &'a FilterChain,
    pub downstream: &'a dyn Downstream,
    pub route_id: &'a str,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub routes: Arc<RouteTable>,
    chains: Chains,
    dispatchers: Arc<HashMap<String, HttpDispatcher>>,
}

impl AppState {
    /// Build routes, filters and dispatchers from configuration.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::ConfigError` if the configuration fails
    /// [`Config::validate`], or for an invalid route table, CORS origin or
    /// HTTP client setup.
    pub fn new(config: Config) -> GatewayResult<Self> {
        config.validate()?;
        let routes = RouteTable::new(&config.routes)?;

        // Validation guarantees a usable secret whenever a route needs one.
        let validator = if routes.any_auth_required() {
            config
                .jwt_secret
                .as_ref()
                .map(|secret| Arc::new(TokenValidator::new(secret)))
        } else {
            None
        };
        let chains = Chains::new(CorsFilter::from_config(&config)?, validator);

        let client = Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| GatewayError::ConfigError(format!("Failed to build HTTP client: {e}")))?;
        let breaker = CircuitBreakerConfig::from(&config);

        let dispatchers = routes
            .iter()
            .map(|route| {
                info!(
                    route = %route.id,
                    upstream = %route.upstream,
                    auth_required = route.auth_required,
                    "Registered route"
                );
                (
                    route.id.clone(),
                    HttpDispatcher::new(route, client.clone(), breaker.clone()),
                )
            })
            .collect();

        Ok(Self {
            config: Arc::new(config),
            routes: Arc::new(routes),
            chains,
            dispatchers: Arc::new(dispatchers),
        })
    }

    /// Pick the chain and downstream for a request.
    ///
    /// `GET /health` is answered locally; unmatched paths go through the
    /// public chain to a 404 so they still get CORS headers and a log line.
    pub fn select(&self, method: &axum::http::Method, path: &str) -> Selected<'_> {
        if method == axum::http::Method::GET && path == "/health" {
            return self.local(LocalTarget::Health);
        }

        match self.routes.resolve(path) {
            Some(route) => match self.dispatchers.get(&route.id) {
                Some(dispatcher) => Selected {
                    chain: self.chains.for_route(route.auth_required),
                    downstream: dispatcher,
                    route_id: dispatcher.route_id(),
                },
                None => self.local(LocalTarget::NotFound),
            },
            None => self.local(LocalTarget::NotFound),
        }
    }

    /// Selection for a request rejected before routing (e.g. body too large).
    pub fn local(&self, target: LocalTarget) -> Selected<'_> {
        let downstream: &'static dyn Downstream = match target {
            LocalTarget::Health => &LocalTarget::Health,
            LocalTarget::NotFound => &LocalTarget::NotFound,
            LocalTarget::PayloadTooLarge => &LocalTarget::PayloadTooLarge,
        };
        Selected {
            chain: &self.chains.public,
            downstream,
            route_id: target.route_id(),
        }
    }

    pub fn dispatcher(&self, route_id: &str) -> Option<&HttpDispatcher> {
        self.dispatchers.get(route_id)
    }
}
