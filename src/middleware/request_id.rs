//! Request correlation IDs.
//!
//! Every request leaves the gateway with an `X-Request-Id`: the caller's
//! own if it sent a usable one, a fresh UUIDv4 otherwise. The same value is
//! written onto the inbound request (so it is forwarded upstream) and onto
//! the response, and the whole request runs inside a `request` span that
//! carries it.
//!
//! ```bash
//! curl -H "X-Request-Id: my-correlation-id" http://localhost:8080/api/orders
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{Instrument, info_span};
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Longest caller-supplied id accepted as-is.
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Clone, Copy, Default)]
pub struct RequestIdLayer;

impl RequestIdLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestIdService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let request_id = request_id_for(&req);
        req.headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), request_id.clone());

        let span = info_span!(
            "request",
            request_id = request_id.to_str().unwrap_or_default()
        );

        // Take the service that was driven to readiness, leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                let mut response = inner.call(req).await?;
                response
                    .headers_mut()
                    .insert(REQUEST_ID_HEADER.clone(), request_id);
                Ok(response)
            }
            .instrument(span),
        )
    }
}

/// The caller's id if it is printable and reasonably short, else a new UUID.
fn request_id_for<B>(req: &Request<B>) -> HeaderValue {
    req.headers()
        .get(&REQUEST_ID_HEADER)
        .filter(|v| {
            let len = v.as_bytes().len();
            len > 0 && len <= MAX_REQUEST_ID_LEN && v.to_str().is_ok()
        })
        .cloned()
        .unwrap_or_else(|| {
            // A UUID is always a valid header value.
            HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
        })
}

/// Read the request id stamped by [`RequestIdLayer`].
pub fn request_id(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers.get(&REQUEST_ID_HEADER).and_then(|v| v.to_str().ok())
}
