//! JSON RPC surface.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                  - Liveness
//! GET  /health/ready            - Readiness (user store and cache reachable)
//!
//! POST /api/auth/login          - Email/password login
//! POST /api/auth/register       - Create account and log in
//! POST /api/auth/oauth          - Federated login (creates account on first sight)
//! POST /api/auth/logout         - Revoke a token
//! POST /api/auth/change-password
//! POST /api/auth/change-email
//! POST /api/auth/email-verify   - Mark email verified
//! POST /api/auth/email-verified - Read verification flag
//! POST /api/auth/token          - Mint a token for an email
//! POST /api/auth/user-email     - Resolve a token
//! POST /api/auth/token-ttl      - Remaining token lifetime
//! ```

pub mod handlers;
pub mod validate;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the credential API router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(handlers::login))
        .route("/register", post(handlers::register))
        .route("/oauth", post(handlers::oauth))
        .route("/logout", post(handlers::logout))
        .route("/change-password", post(handlers::change_password))
        .route("/change-email", post(handlers::change_email))
        .route("/email-verify", post(handlers::email_verify))
        .route("/email-verified", post(handlers::email_verified))
        .route("/token", post(handlers::create_token))
        .route("/user-email", post(handlers::user_email))
        .route("/token-ttl", post(handlers::token_ttl))
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api/auth", auth_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if either backing store is unreachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    if let Err(e) = state.users().ping().await {
        tracing::warn!(error = %e, "user store not ready");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    if let Err(e) = state.cache().ping().await {
        tracing::warn!(error = %e, "cache not ready");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}
