use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::fallback::FallbackResponse;

/// Why a downstream call did not complete normally.
///
/// A backend that answers with an error status is *not* a dispatch failure;
/// that status simply becomes the exchange's response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    #[error("upstream timed out")]
    Timeout,

    #[error("connection to upstream failed: {0}")]
    Connect(String),

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("upstream transport error: {0}")]
    Transport(String),
}

/// Gateway-wide error types with appropriate HTTP status codes.
///
/// Filters only handle the variants they own (authentication → 401, CORS →
/// the local-override rewrite). Everything else propagates to the filter
/// chain engine, which turns it into a terminal response via
/// [`GatewayError::status_code`] and [`GatewayError::body`].
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Response already committed")]
    ResponseCommitted,

    #[error("Dispatch to route '{route}' failed: {failure}")]
    Dispatch {
        route: String,
        /// Display name of the service the route's fallback describes.
        fallback: Option<String>,
        failure: DispatchFailure,
    },

    #[error("No route for path: {0}")]
    RouteNotFound(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body sent to clients.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl GatewayError {
    /// Status code of the terminal response synthesized for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::Dispatch {
                fallback: Some(_), ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Dispatch { failure, .. } => match failure {
                DispatchFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
                DispatchFailure::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
                DispatchFailure::Connect(_) | DispatchFailure::Transport(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::ResponseCommitted
            | GatewayError::Internal(_)
            | GatewayError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body of the terminal response synthesized for this error.
    ///
    /// Only sanitized messages are exposed; the full error is logged
    /// server-side by the caller.
    pub fn body(&self) -> Vec<u8> {
        if let GatewayError::Dispatch {
            fallback: Some(service),
            ..
        } = self
        {
            return FallbackResponse::for_service(service).to_bytes();
        }

        let (error_type, message) = match self {
            GatewayError::Unauthorized => ("unauthorized", "Authentication required"),
            GatewayError::Dispatch { failure, .. } => match failure {
                DispatchFailure::Timeout => ("upstream_timeout", "Upstream service timed out"),
                DispatchFailure::CircuitOpen => (
                    "service_unavailable",
                    "Upstream service is temporarily unavailable. Please try again later.",
                ),
                DispatchFailure::Connect(_) | DispatchFailure::Transport(_) => {
                    ("bad_gateway", "Upstream service could not be reached")
                }
            },
            GatewayError::RouteNotFound(_) => ("not_found", "No route matches the request path"),
            GatewayError::PayloadTooLarge => ("payload_too_large", "Request body too large"),
            GatewayError::ResponseCommitted
            | GatewayError::Internal(_)
            | GatewayError::ConfigError(_) => (
                "internal_error",
                "An internal error occurred. Please contact support if the issue persists.",
            ),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: message.to_string(),
        };
        serde_json::to_vec(&body).unwrap_or_default()
    }

    /// Whether this error is a failed downstream call.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(self, GatewayError::Dispatch { .. })
    }
}

/// Convenience type alias for Results with GatewayError.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn dispatch(failure: DispatchFailure, fallback: Option<&str>) -> GatewayError {
        GatewayError::Dispatch {
            route: "order-service".to_string(),
            fallback: fallback.map(str::to_string),
            failure,
        }
    }

    #[test]
    fn test_dispatch_with_fallback_is_503() {
        let err = dispatch(DispatchFailure::Timeout, Some("Order Service"));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let body: serde_json::Value = serde_json::from_slice(&err.body()).unwrap();
        assert_eq!(body["error"], "Order Service is currently unavailable");
    }

    #[test]
    fn test_dispatch_without_fallback_status() {
        assert_eq!(
            dispatch(DispatchFailure::Timeout, None).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            dispatch(DispatchFailure::CircuitOpen, None).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            dispatch(DispatchFailure::Connect("refused".into()), None).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_error_does_not_leak_details() {
        let err = GatewayError::Internal("database password is hunter2".to_string());
        let body = String::from_utf8(err.body()).unwrap();
        assert!(!body.contains("hunter2"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
