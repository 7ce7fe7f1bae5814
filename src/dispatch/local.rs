//! Downstream targets answered by the gateway itself.

use async_trait::async_trait;
use axum::http::header::{CONTENT_TYPE, HeaderValue};
use axum::http::StatusCode;
use serde::Serialize;

use crate::error::{GatewayError, GatewayResult};
use crate::pipeline::{Downstream, Exchange};

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalTarget {
    /// `GET /health`: `200 {"status":"UP"}`.
    Health,
    /// No route matched the path.
    NotFound,
    /// The request body exceeded the configured limit.
    PayloadTooLarge,
}

impl LocalTarget {
    pub fn route_id(&self) -> &'static str {
        match self {
            LocalTarget::Health => "health",
            LocalTarget::NotFound | LocalTarget::PayloadTooLarge => "unrouted",
        }
    }
}

#[async_trait]
impl Downstream for LocalTarget {
    async fn dispatch(&self, exchange: &mut Exchange) -> GatewayResult<()> {
        match self {
            LocalTarget::Health => {
                let body = serde_json::to_vec(&HealthResponse { status: "UP" })
                    .map_err(|e| GatewayError::Internal(e.to_string()))?;
                exchange.set_status(StatusCode::OK)?;
                exchange.set_response_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))?;
                exchange.set_response_body(body)
            }
            LocalTarget::NotFound => Err(GatewayError::RouteNotFound(exchange.path().to_string())),
            LocalTarget::PayloadTooLarge => Err(GatewayError::PayloadTooLarge),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::http::{HeaderMap, Method, Uri};
    use bytes::Bytes;

    use super::*;

    fn exchange(path: &'static str) -> Exchange {
        Exchange::new(Method::GET, Uri::from_static(path), HeaderMap::new(), Bytes::new())
    }

    #[tokio::test]
    async fn test_health_reports_up() {
        let mut ex = exchange("/health");
        LocalTarget::Health.dispatch(&mut ex).await.unwrap();

        assert_eq!(ex.status(), Some(StatusCode::OK));
        let body: serde_json::Value = serde_json::from_slice(ex.response_body()).unwrap();
        assert_eq!(body, serde_json::json!({"status": "UP"}));
    }

    #[tokio::test]
    async fn test_not_found_and_too_large() {
        let mut ex = exchange("/nowhere");
        let err = LocalTarget::NotFound.dispatch(&mut ex).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = LocalTarget::PayloadTooLarge.dispatch(&mut ex).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(ex.status().is_none());
    }
}
