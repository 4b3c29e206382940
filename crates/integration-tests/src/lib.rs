//! Integration tests for authsvc.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests (memory backends, no services needed)
//! cargo test -p authsvc-integration-tests
//!
//! # Including the PostgreSQL store tests
//! AUTH_DATABASE_URL=postgres://... cargo test -p authsvc-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `health` - Liveness and readiness
//! - `auth_api` - RPC surface driven through the router
//! - `postgres_store` - `PgUserStore` against a live database

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use tower::ServiceExt;

use authsvc_server::config::{AuthConfig, CacheConfig, LastLoginMode, UserStoreConfig};
use authsvc_server::services::TtlPolicy;
use authsvc_server::state::AppState;

/// Short session lifetime used by the test service.
pub const TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Remembered session lifetime used by the test service.
pub const REMEMBER_ME_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Service configuration with memory backends and cheap hashing.
#[must_use]
pub fn memory_config(last_login: LastLoginMode) -> AuthConfig {
    AuthConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        user_store: UserStoreConfig::Memory,
        cache: CacheConfig::Memory { capacity: 10_000 },
        ttl: TtlPolicy {
            default: TOKEN_TTL,
            remember_me: REMEMBER_ME_TTL,
        },
        last_login,
        argon2_memory_kib: Some(1024),
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// A response decoded for assertions.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
    pub text: String,
}

/// The full router over fresh memory backends, driven in-process.
pub struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    /// Build an app with synchronous last-login writes.
    ///
    /// # Panics
    ///
    /// Panics if the memory backends cannot be built.
    pub async fn new() -> Self {
        Self::with_last_login(LastLoginMode::Sync).await
    }

    /// Build an app with the given last-login mode.
    ///
    /// # Panics
    ///
    /// Panics if the memory backends cannot be built.
    pub async fn with_last_login(mode: LastLoginMode) -> Self {
        let state = authsvc_server::build_state(&memory_config(mode))
            .await
            .expect("memory backends should build");
        Self {
            router: authsvc_server::router(state.clone()),
            state,
        }
    }

    /// Shared state, for reaching past the RPC surface.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Send a request through the router.
    ///
    /// # Panics
    ///
    /// Panics if the router fails or the body cannot be read.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }

    /// POST a JSON body.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built.
    pub async fn post(&self, path: &str, body: &Value) -> TestResponse {
        let request = Request::post(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build");
        self.send(request).await
    }

    /// GET a path.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built.
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::get(path)
            .body(Body::empty())
            .expect("request should build");
        self.send(request).await
    }
}
