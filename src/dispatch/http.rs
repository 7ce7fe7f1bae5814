//! Reverse-proxy dispatcher for one upstream route.
//!
//! Forwards method, path, query, body and the (possibly filter-amended)
//! request headers to the route's upstream, then copies the upstream
//! status, headers and body into the exchange. A backend answering with an
//! error status is a normal response; only transport-level problems become
//! [`DispatchFailure`]s.

use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use axum::http::header::{self, HeaderMap};
use axum::http::{StatusCode, Uri};
use bytes::Bytes;
use reqwest::{Client, Url};
use tracing::{debug, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{DispatchFailure, GatewayError, GatewayResult};
use crate::pipeline::{Downstream, Exchange};
use crate::routes::Route;

/// Headers meaningful only for a single transport hop.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Upstream CORS headers are dropped; the gateway owns the CORS policy.
const CORS_PREFIX: &str = "access-control-";

pub struct HttpDispatcher {
    route_id: String,
    upstream: Url,
    fallback: Option<String>,
    client: Client,
    breaker: CircuitBreaker,
}

impl HttpDispatcher {
    pub fn new(route: &Route, client: Client, breaker: CircuitBreakerConfig) -> Self {
        Self {
            route_id: route.id.clone(),
            upstream: route.upstream.clone(),
            fallback: route.fallback.clone(),
            client,
            breaker: CircuitBreaker::new(route.id.clone(), breaker),
        }
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Upstream URL for an inbound URI: the upstream's base path followed by
    /// the request path and query.
    fn target_url(&self, uri: &Uri) -> Url {
        let mut url = self.upstream.clone();
        let base = self.upstream.path().trim_end_matches('/');
        url.set_path(&format!("{base}{}", uri.path()));
        url.set_query(uri.query());
        url
    }

    fn fail(&self, failure: DispatchFailure) -> GatewayError {
        GatewayError::Dispatch {
            route: self.route_id.clone(),
            fallback: self.fallback.clone(),
            failure,
        }
    }

    async fn send(&self, exchange: &Exchange) -> Result<Upstream, DispatchFailure> {
        let url = self.target_url(exchange.uri());
        debug!(
            request_id = exchange.request_id(),
            route = %self.route_id,
            %url,
            "Forwarding to upstream"
        );

        let response = self
            .client
            .request(exchange.method().clone(), url)
            .headers(strip_hop_by_hop(exchange.forwarded_headers(), true))
            .body(exchange.request_body().clone())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let headers = strip_hop_by_hop(response.headers(), false);
        let body = response.bytes().await.map_err(classify)?;
        Ok(Upstream {
            status,
            headers,
            body,
        })
    }
}

/// A complete upstream response.
struct Upstream {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Upstream {
    fn write_to(self, exchange: &mut Exchange) -> GatewayResult<()> {
        exchange.set_status(self.status)?;
        for (name, value) in &self.headers {
            if name.as_str().starts_with(CORS_PREFIX) || name == header::CONTENT_LENGTH {
                continue;
            }
            exchange.append_response_header(name.clone(), value.clone())?;
        }
        exchange.set_response_body(self.body)
    }
}

#[async_trait]
impl Downstream for HttpDispatcher {
    async fn dispatch(&self, exchange: &mut Exchange) -> GatewayResult<()> {
        self.breaker.try_acquire().await.map_err(|f| self.fail(f))?;

        let started = Instant::now();
        match self.send(exchange).await {
            Ok(upstream) => {
                self.breaker.record_success().await;
                upstream.write_to(exchange)?;
                debug!(
                    request_id = exchange.request_id(),
                    route = %self.route_id,
                    status = exchange.status().map(|s| s.as_u16()),
                    upstream_ms = started.elapsed().as_millis() as u64,
                    "Upstream responded"
                );
                Ok(())
            }
            Err(failure) => {
                self.breaker.record_failure().await;
                warn!(
                    request_id = exchange.request_id(),
                    route = %self.route_id,
                    error = %failure,
                    "Upstream dispatch failed"
                );
                Err(self.fail(failure))
            }
        }
    }
}

fn classify(err: reqwest::Error) -> DispatchFailure {
    if err.is_timeout() {
        DispatchFailure::Timeout
    } else if err.is_connect() {
        DispatchFailure::Connect(err.to_string())
    } else {
        DispatchFailure::Transport(err.to_string())
    }
}

/// Copy `headers` without hop-by-hop headers, including any named in
/// `Connection`. Request-side copies also drop `Host`; the client sets it
/// from the upstream URL.
fn strip_hop_by_hop(headers: &HeaderMap, request: bool) -> HeaderMap {
    let listed: HashSet<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(&name.as_str())
            || listed.contains(name.as_str())
            || (request && name == header::HOST)
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
