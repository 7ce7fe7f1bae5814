//! End-to-end tests: a real gateway and a mock upstream on ephemeral ports,
//! driven over HTTP with reqwest.
//!
//! Run with: `cargo test --test integration_tests`
//!
//! Requests to `127.0.0.1` carry a trusted-local `Host`, so tests that need
//! the remote-caller behavior set `Host: gateway.example.com` explicitly.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use reqwest::Client;
use secrecy::SecretString;
use serde_json::{Value, json};

use edge_gateway::routes::RouteConfig;
use edge_gateway::{AppState, Config, build_router};

const SECRET: &str = "integration_secret_key_32_bytes!!";
const REMOTE_HOST: &str = "gateway.example.com";

/// Bind an ephemeral port and serve `router` on it.
async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to ephemeral port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A port with nothing listening on it.
fn dead_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn mock_backend() -> Router {
    async fn whoami(headers: HeaderMap) -> impl IntoResponse {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        axum::Json(json!({
            "username": header("x-username"),
            "request_id": header("x-request-id"),
            "host": header("host"),
        }))
    }

    async fn forbidden() -> impl IntoResponse {
        (StatusCode::FORBIDDEN, "nope")
    }

    async fn ping() -> impl IntoResponse {
        (
            [
                ("access-control-allow-origin", "https://upstream.example"),
                ("x-upstream", "user-service"),
            ],
            "pong",
        )
    }

    async fn echo(body: String) -> impl IntoResponse {
        (StatusCode::CREATED, body)
    }

    Router::new()
        .route("/api/users/me", get(whoami))
        .route("/api/auth/forbidden", get(forbidden))
        .route("/api/auth/ping", get(ping))
        .route("/api/auth/echo", post(echo))
        .route("/api/orders/{id}", get(|| async { "order" }))
}

struct TestFixture {
    base_url: String,
    client: Client,
}

impl TestFixture {
    async fn new() -> Self {
        let backend = serve(mock_backend()).await;
        let upstream = format!("http://{backend}");
        let dead = format!("http://127.0.0.1:{}", dead_port());

        let route = |id: &str, path: &str, upstream: &str, auth: bool, fallback: Option<&str>| {
            RouteConfig {
                id: id.to_string(),
                paths: vec![path.to_string()],
                upstream: upstream.to_string(),
                auth_required: auth,
                fallback: fallback.map(str::to_string),
            }
        };

        let config = Config {
            jwt_secret: Some(SecretString::from(SECRET)),
            metrics_port: 0,
            routes: vec![
                route("user-auth", "/api/auth/**", &upstream, false, Some("User Service")),
                route("user-service", "/api/users/**", &upstream, true, Some("User Service")),
                route("order-service", "/api/orders/**", &upstream, true, Some("Order Service")),
                route("payment-service", "/api/payments/**", &dead, true, Some("Payment Service")),
                route("legacy", "/api/legacy/**", &dead, false, None),
            ],
            ..Config::default()
        };
        config.validate().unwrap();

        let gateway = serve(build_router(AppState::new(config).unwrap())).await;

        Self {
            base_url: format!("http://{gateway}"),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn remote_get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).header("host", REMOTE_HOST)
    }
}

fn token(sub: &str) -> String {
    encode(
        &Header::default(),
        &json!({"sub": sub, "exp": Utc::now().timestamp() + 600}),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn assert_cors(headers: &reqwest::header::HeaderMap) {
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-headers"], "*");
    assert_eq!(headers["access-control-expose-headers"], "*");
    assert_eq!(headers["access-control-max-age"], "3600");
    assert!(headers.contains_key("access-control-allow-methods"));
    assert!(headers.contains_key("access-control-allow-credentials"));
}

// =============================================================================
// Health & routing
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fx = TestFixture::new().await;
    let response = fx.remote_get("/health").send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_cors(response.headers());
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "UP"}));
}

#[tokio::test]
async fn test_unrouted_path_is_404() {
    let fx = TestFixture::new().await;
    let response = fx.remote_get("/does/not/exist").send().await.unwrap();

    assert_eq!(response.status(), 404);
    assert_cors(response.headers());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_public_route_proxies_and_owns_cors() {
    let fx = TestFixture::new().await;
    let response = fx.remote_get("/api/auth/ping").send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_cors(response.headers());
    assert_eq!(response.headers()["x-upstream"], "user-service");
    assert_eq!(response.text().await.unwrap(), "pong");
}

#[tokio::test]
async fn test_body_and_status_are_forwarded() {
    let fx = TestFixture::new().await;
    let response = fx
        .client
        .post(fx.url("/api/auth/echo"))
        .header("host", REMOTE_HOST)
        .body(r#"{"username":"alice"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert_eq!(response.text().await.unwrap(), r#"{"username":"alice"}"#);
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn test_preflight_answered_at_edge() {
    let fx = TestFixture::new().await;
    let response = fx
        .client
        .request(reqwest::Method::OPTIONS, fx.url("/api/orders/1"))
        .header("host", REMOTE_HOST)
        .header("origin", "https://app.example")
        .header("access-control-request-method", "DELETE")
        .send()
        .await
        .unwrap();

    // Protected route, no token: still 200.
    assert_eq!(response.status(), 200);
    assert_cors(response.headers());
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_local_forbidden_becomes_ok() {
    let fx = TestFixture::new().await;
    // Host defaults to 127.0.0.1:<port>, a trusted-local host.
    let response = fx
        .client
        .get(fx.url("/api/auth/forbidden"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_cors(response.headers());
}

#[tokio::test]
async fn test_remote_forbidden_is_kept() {
    let fx = TestFixture::new().await;
    let response = fx.remote_get("/api/auth/forbidden").send().await.unwrap();

    assert_eq!(response.status(), 403);
    assert_cors(response.headers());
    assert_eq!(response.text().await.unwrap(), "nope");
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_missing_token_is_401() {
    let fx = TestFixture::new().await;
    let response = fx.remote_get("/api/users/me").send().await.unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(response.headers()["www-authenticate"], "Bearer");
    assert_cors(response.headers());
}

#[tokio::test]
async fn test_garbage_token_is_401() {
    let fx = TestFixture::new().await;
    let response = fx
        .remote_get("/api/users/me")
        .bearer_auth("garbage")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_local_caller_still_gets_401() {
    let fx = TestFixture::new().await;
    let response = fx.client.get(fx.url("/api/users/me")).send().await.unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_valid_token_forwards_username() {
    let fx = TestFixture::new().await;
    let response = fx
        .remote_get("/api/users/me")
        .bearer_auth(token("alice"))
        .header("x-username", "mallory")
        .header("x-request-id", "corr-42")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-request-id"], "corr-42");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["username"], "alice");
    assert_eq!(body["request_id"], "corr-42");
    // Host is rewritten for the upstream.
    assert_ne!(body["host"], REMOTE_HOST);
}

// =============================================================================
// Downstream failures
// =============================================================================

#[tokio::test]
async fn test_dead_upstream_remote_gets_fallback() {
    let fx = TestFixture::new().await;
    let response = fx
        .remote_get("/api/payments/1")
        .bearer_auth(token("alice"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 503);
    assert_cors(response.headers());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Payment Service is currently unavailable");
    assert_eq!(body["message"], "Please try again later");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_dead_upstream_without_fallback_is_502() {
    let fx = TestFixture::new().await;
    let response = fx.remote_get("/api/legacy/x").send().await.unwrap();

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "bad_gateway");
}

#[tokio::test]
async fn test_dead_upstream_local_is_swallowed() {
    let fx = TestFixture::new().await;
    let response = fx
        .client
        .get(fx.url("/api/payments/1"))
        .bearer_auth(token("alice"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_cors(response.headers());
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_default_routes_when_unset() {
    // Sanity check on the shipped table rather than the fixture's.
    let routes = RouteConfig::defaults();
    assert!(routes.iter().any(|r| r.id == "order-service" && r.auth_required));
    assert!(routes.iter().any(|r| r.id == "user-auth" && !r.auth_required));
}
