//! Fallback payloads for unavailable services.
//!
//! When a route with a configured fallback cannot be reached (timeout,
//! refused connection, open circuit breaker), clients get a 503 with a
//! short JSON body naming the service instead of a transport error:
//!
//! ```json
//! {
//!   "error": "Order Service is currently unavailable",
//!   "message": "Please try again later",
//!   "timestamp": "2024-01-15T10:30:00Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Body of a fallback response.
#[derive(Debug, Serialize)]
pub struct FallbackResponse {
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl FallbackResponse {
    /// Build the payload describing `service` as unavailable.
    pub fn for_service(service: &str) -> Self {
        Self {
            error: format!("{service} is currently unavailable"),
            message: "Please try again later".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}
