//! Per-request mutable state flowing through the filter pipeline.
//!
//! An [`Exchange`] pairs the inbound request with the response under
//! construction. It is owned by the task serving the request; filters get
//! sequential `&mut` access, never concurrent.
//!
//! # Committed responses
//!
//! Once [`Exchange::commit`] has been called the response is final: any
//! further attempt to change status, headers or body returns
//! [`GatewayError::ResponseCommitted`] instead of being silently dropped.
//!
//! # Forwarded headers
//!
//! The inbound headers are never mutated. Filters that need to add a header
//! for the downstream call (e.g. `X-Username`) write to a copy-on-write
//! overlay via [`Exchange::forward_header`]; stages that ran earlier keep
//! seeing the original request.

use std::str::FromStr;

use axum::body::Body;
use axum::http::header::{HOST, HeaderName, HeaderValue};
use axum::http::uri::Authority;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use bytes::Bytes;

use crate::error::{GatewayError, GatewayResult};
use crate::pipeline::Outcome;

/// Response under construction.
#[derive(Debug, Default)]
struct ResponseState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Bytes,
    committed: bool,
}

/// The mutable unit of work for one request/response cycle.
#[derive(Debug)]
pub struct Exchange {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    forwarded: Option<HeaderMap>,
    request_id: Option<String>,
    route_id: Option<String>,
    response: ResponseState,
}

impl Exchange {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            forwarded: None,
            request_id: None,
            route_id: None,
            response: ResponseState::default(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_route(mut self, route_id: impl Into<String>) -> Self {
        self.route_id = Some(route_id.into());
        self
    }

    // ── Request side ──────────────────────────────────────────────────────────

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Inbound headers exactly as received.
    pub fn request_headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn request_body(&self) -> &Bytes {
        &self.body
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    /// Case-insensitive inbound header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Host the client addressed, without port.
    ///
    /// Taken from the URI authority when the request line is absolute,
    /// otherwise from the `Host` header. IPv6 brackets are stripped.
    pub fn host(&self) -> Option<&str> {
        let host = match self.uri.host() {
            Some(host) => host,
            None => {
                let raw = self.headers.get(HOST)?.to_str().ok()?;
                host_of(raw)?
            }
        };
        Some(host.trim_start_matches('[').trim_end_matches(']'))
    }

    /// Add a header to the request sent downstream.
    ///
    /// The first call clones the inbound headers into the forwarded set;
    /// [`Exchange::request_headers`] is left untouched.
    pub fn forward_header(&mut self, name: HeaderName, value: HeaderValue) {
        let inbound = &self.headers;
        self.forwarded
            .get_or_insert_with(|| inbound.clone())
            .insert(name, value);
    }

    /// Headers to send downstream: the forwarded overlay if any filter wrote
    /// one, otherwise the inbound headers.
    pub fn forwarded_headers(&self) -> &HeaderMap {
        self.forwarded.as_ref().unwrap_or(&self.headers)
    }

    // ── Response side ─────────────────────────────────────────────────────────

    pub fn status(&self) -> Option<StatusCode> {
        self.response.status
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response.headers
    }

    pub fn response_body(&self) -> &Bytes {
        &self.response.body
    }

    pub fn is_committed(&self) -> bool {
        self.response.committed
    }

    pub fn set_status(&mut self, status: StatusCode) -> GatewayResult<()> {
        self.ensure_writable()?;
        self.response.status = Some(status);
        Ok(())
    }

    /// Set (replace) a response header.
    pub fn set_response_header(&mut self, name: HeaderName, value: HeaderValue) -> GatewayResult<()> {
        self.ensure_writable()?;
        self.response.headers.insert(name, value);
        Ok(())
    }

    /// Append a response header, keeping any existing values.
    pub fn append_response_header(
        &mut self,
        name: HeaderName,
        value: HeaderValue,
    ) -> GatewayResult<()> {
        self.ensure_writable()?;
        self.response.headers.append(name, value);
        Ok(())
    }

    pub fn set_response_body(&mut self, body: impl Into<Bytes>) -> GatewayResult<()> {
        self.ensure_writable()?;
        self.response.body = body.into();
        Ok(())
    }

    /// Mark the response final. Idempotent.
    pub fn commit(&mut self) {
        self.response.committed = true;
    }

    /// Complete the response with `status` and an empty body, bypassing the
    /// rest of the chain.
    pub fn short_circuit(&mut self, status: StatusCode) -> GatewayResult<Outcome> {
        self.set_status(status)?;
        self.response.body = Bytes::new();
        self.commit();
        Ok(Outcome::ShortCircuit)
    }

    /// Replace the response with the terminal response for `err` and commit.
    ///
    /// Headers already set (CORS, request id) are kept. This bypasses the
    /// committed check: it is the engine's last resort for an exchange that
    /// would otherwise have no response at all.
    pub(crate) fn terminate_with(&mut self, err: &GatewayError) {
        self.response.status = Some(err.status_code());
        self.response.headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.response.body = Bytes::from(err.body());
        self.commit();
    }

    /// Convert into the HTTP response sent to the client.
    ///
    /// An exchange without a status is answered with 500; the filter chain
    /// engine never lets that happen, but the conversion must be total.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.response.body));
        *response.status_mut() = self
            .response
            .status
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        *response.headers_mut() = self.response.headers;
        response
    }

    fn ensure_writable(&self) -> GatewayResult<()> {
        if self.response.committed {
            Err(GatewayError::ResponseCommitted)
        } else {
            Ok(())
        }
    }
}

/// Host part of a `Host` header value.
fn host_of(raw: &str) -> Option<&str> {
    // Authority parsing validates the value; slice the original so the
    // borrow outlives the parsed value.
    let authority = Authority::from_str(raw).ok()?;
    let host = authority.host();
    let start = raw.rfind(host)?;
    raw.get(start..start + host.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn exchange_with_host(host: &str) -> Exchange {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_str(host).unwrap());
        Exchange::new(Method::GET, Uri::from_static("/api/orders"), headers, Bytes::new())
    }

    #[test]
    fn test_host_strips_port() {
        assert_eq!(exchange_with_host("localhost:8080").host(), Some("localhost"));
        assert_eq!(exchange_with_host("127.0.0.1").host(), Some("127.0.0.1"));
        assert_eq!(exchange_with_host("[::1]:8080").host(), Some("::1"));
    }

    #[test]
    fn test_host_prefers_absolute_uri() {
        let mut exchange = exchange_with_host("example.com");
        exchange.uri = Uri::from_static("http://localhost:8080/x");
        assert_eq!(exchange.host(), Some("localhost"));
    }

    #[test]
    fn test_host_missing() {
        let exchange =
            Exchange::new(Method::GET, Uri::from_static("/"), HeaderMap::new(), Bytes::new());
        assert_eq!(exchange.host(), None);
    }

    #[test]
    fn test_forward_header_is_copy_on_write() {
        let mut exchange = exchange_with_host("localhost");
        assert!(std::ptr::eq(
            exchange.forwarded_headers(),
            exchange.request_headers()
        ));

        exchange.forward_header(
            HeaderName::from_static("x-username"),
            HeaderValue::from_static("alice"),
        );

        assert_eq!(exchange.forwarded_headers()["x-username"], "alice");
        assert_eq!(exchange.forwarded_headers()[HOST], "localhost");
        assert!(exchange.request_headers().get("x-username").is_none());
    }

    #[test]
    fn test_committed_rejects_mutation() {
        let mut exchange = exchange_with_host("localhost");
        exchange.set_status(StatusCode::OK).unwrap();
        exchange.commit();

        assert!(matches!(
            exchange.set_status(StatusCode::FORBIDDEN),
            Err(GatewayError::ResponseCommitted)
        ));
        assert!(matches!(
            exchange.set_response_header(
                HeaderName::from_static("x-late"),
                HeaderValue::from_static("1")
            ),
            Err(GatewayError::ResponseCommitted)
        ));
        assert!(matches!(
            exchange.set_response_body("late"),
            Err(GatewayError::ResponseCommitted)
        ));
        assert_eq!(exchange.status(), Some(StatusCode::OK));
    }

    #[test]
    fn test_short_circuit_commits_with_empty_body() {
        let mut exchange = exchange_with_host("localhost");
        exchange.set_response_body("stale").unwrap();

        let outcome = exchange.short_circuit(StatusCode::UNAUTHORIZED).unwrap();

        assert_eq!(outcome, Outcome::ShortCircuit);
        assert!(exchange.is_committed());
        assert!(exchange.response_body().is_empty());
        assert_eq!(exchange.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_into_response_without_status_is_500() {
        let exchange = exchange_with_host("localhost");
        assert_eq!(
            exchange.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
