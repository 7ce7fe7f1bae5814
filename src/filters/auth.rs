//! Bearer-token authentication filter.
//!
//! Attached only to routes whose policy requires authentication. Requests
//! must carry `Authorization: Bearer <token>` with a token the
//! [`TokenValidator`] accepts; anything else is answered with `401` and a
//! `WWW-Authenticate: Bearer` challenge, without saying *why*.
//!
//! On success the token's subject is forwarded to the backend as
//! `X-Username`. Only the downstream-bound copy of the headers is changed;
//! the inbound request stays as received.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::{AUTHORIZATION, HeaderName, HeaderValue, WWW_AUTHENTICATE};
use axum::http::StatusCode;
use tracing::{debug, warn};

use crate::auth::{Identity, TokenError, TokenValidator};
use crate::error::GatewayResult;
use crate::metrics;
use crate::pipeline::{Exchange, Filter, FilterOrder, Next, Outcome};

/// Header carrying the authenticated subject to the backend.
pub static USERNAME_HEADER: HeaderName = HeaderName::from_static("x-username");

/// Scheme prefix required on the `Authorization` header (case-sensitive).
pub const BEARER_PREFIX: &str = "Bearer ";

/// Why a request was not authenticated. Logged and counted, never sent.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Rejection {
    MissingHeader,
    NotBearer,
    InvalidToken(TokenError),
    UnencodableSubject,
}

impl Rejection {
    fn as_str(&self) -> &'static str {
        match self {
            Rejection::MissingHeader => "missing_header",
            Rejection::NotBearer => "not_bearer",
            Rejection::InvalidToken(e) => e.as_str(),
            Rejection::UnencodableSubject => "unencodable_subject",
        }
    }
}

pub struct AuthenticationFilter {
    validator: Arc<TokenValidator>,
}

impl AuthenticationFilter {
    pub fn new(validator: Arc<TokenValidator>) -> Self {
        Self { validator }
    }

    fn authenticate(&self, exchange: &Exchange) -> Result<Identity, Rejection> {
        let header = exchange
            .request_headers()
            .get(AUTHORIZATION)
            .ok_or(Rejection::MissingHeader)?;

        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .ok_or(Rejection::NotBearer)?;

        self.validator
            .validate(token)
            .map_err(Rejection::InvalidToken)
    }
}

#[async_trait]
impl Filter for AuthenticationFilter {
    fn name(&self) -> &str {
        "bearer-auth"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::AUTH
    }

    async fn filter(&self, exchange: &mut Exchange, next: Next<'_>) -> GatewayResult<Outcome> {
        let verdict = self.authenticate(exchange).and_then(|identity| {
            HeaderValue::from_str(&identity.subject).map_err(|_| Rejection::UnencodableSubject)
        });

        let username = match verdict {
            Ok(username) => username,
            Err(rejection) => {
                warn!(
                    request_id = exchange.request_id(),
                    path = %exchange.path(),
                    reason = rejection.as_str(),
                    "Rejected unauthenticated request"
                );
                metrics::record_auth_rejection(rejection.as_str());
                exchange.set_response_header(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))?;
                return exchange.short_circuit(StatusCode::UNAUTHORIZED);
            }
        };

        debug!(
            request_id = exchange.request_id(),
            username = ?username,
            "Authenticated request"
        );
        exchange.forward_header(USERNAME_HEADER.clone(), username);
        next.run(exchange).await
    }
}
