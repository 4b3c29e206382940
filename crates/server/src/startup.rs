//! Backend selection and router assembly.

use std::sync::Arc;

use axum::{Router, extract::Request};
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::cache::{CacheError, MemoryCache, RedisCache, SessionCache};
use crate::config::{AuthConfig, CacheConfig, UserStoreConfig};
use crate::db::{self, MemoryUserStore, PgUserStore, UserStore};
use crate::middleware::request_id_middleware;
use crate::rpc;
use crate::services::{AuthService, LastLoginRecorder, PasswordHasher};
use crate::state::AppState;

/// Errors that can occur while wiring the service.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to connect to cache: {0}")]
    Cache(#[from] CacheError),

    #[error("invalid argon2 parameters: {0}")]
    Argon2(#[from] argon2::Error),
}

/// Build the user store, cache and credential service named by `config`.
///
/// Queued last-login mode spawns its worker here, so this must run inside
/// a tokio runtime.
///
/// # Errors
///
/// Returns `StartupError` if a backend cannot be reached or the hashing
/// parameters are invalid.
pub async fn build_state(config: &AuthConfig) -> Result<AppState, StartupError> {
    let users: Arc<dyn UserStore> = match &config.user_store {
        UserStoreConfig::Postgres { database_url } => {
            let pool = db::create_pool(database_url).await?;
            tracing::info!("Database pool created");
            Arc::new(PgUserStore::new(pool))
        }
        UserStoreConfig::Memory => {
            tracing::warn!("Using in-memory user store; accounts are lost on restart");
            Arc::new(MemoryUserStore::new())
        }
    };

    let cache: Arc<dyn SessionCache> = match &config.cache {
        CacheConfig::Memory { capacity } => Arc::new(MemoryCache::new(*capacity)),
        CacheConfig::Redis { url } => {
            let cache = RedisCache::connect(url).await?;
            tracing::info!("Redis connection established");
            Arc::new(cache)
        }
    };

    let hasher = match config.argon2_memory_kib {
        Some(kib) => PasswordHasher::with_memory_kib(kib)?,
        None => PasswordHasher::default(),
    };

    let last_login = LastLoginRecorder::new(Arc::clone(&users), config.last_login);
    let auth = AuthService::new(
        Arc::clone(&users),
        Arc::clone(&cache),
        hasher,
        last_login,
        config.ttl,
    );

    Ok(AppState::new(auth, users, cache))
}

/// Assemble the router with request tracing.
///
/// Sentry layers are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(rpc::routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
}
