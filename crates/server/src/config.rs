//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `AUTH_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`;
//!   only when `AUTH_USER_STORE=postgres`)
//! - `AUTH_REDIS_URL` - Redis connection string (only when `AUTH_CACHE_BACKEND=redis`)
//!
//! ## Optional
//! - `AUTH_HOST` - Bind address (default: 127.0.0.1)
//! - `AUTH_PORT` - Listen port (default: 44044)
//! - `AUTH_USER_STORE` - `postgres` or `memory` (default: postgres)
//! - `AUTH_CACHE_BACKEND` - `memory` or `redis` (default: memory)
//! - `AUTH_CACHE_CAPACITY` - Max entries for the memory cache (default: 100000)
//! - `AUTH_TOKEN_TTL_SECS` - Session lifetime without "remember me" (default: 3600)
//! - `AUTH_REMEMBER_ME_TOKEN_TTL_SECS` - Session lifetime with "remember me" (default: 2592000, at most one year)
//! - `AUTH_LAST_LOGIN_MODE` - `sync` or `queued` (default: sync)
//! - `AUTH_LAST_LOGIN_QUEUE_CAPACITY` - Bounded queue size for `queued` mode (default: 1024)
//! - `AUTH_ARGON2_MEMORY_KIB` - Argon2 memory cost override
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::cache::MAX_TTL;
use crate::services::TtlPolicy;

const DEFAULT_TOKEN_TTL_SECS: u64 = 60 * 60;
const DEFAULT_REMEMBER_ME_TOKEN_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Which durable user store to build.
#[derive(Debug, Clone)]
pub enum UserStoreConfig {
    /// `PostgreSQL` via sqlx (connection string contains password).
    Postgres { database_url: SecretString },
    /// Process-local store; data is lost on restart.
    Memory,
}

/// Which volatile key/value backend holds tokens and verification flags.
#[derive(Debug, Clone)]
pub enum CacheConfig {
    /// In-process moka cache with per-entry expiry.
    Memory { capacity: u64 },
    /// Redis with native key expiry.
    Redis { url: SecretString },
}

/// How last-login metadata is written after a successful login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastLoginMode {
    /// Written before the token is issued; a failed write fails the login.
    Sync,
    /// Handed to a bounded background queue; the token is issued first.
    Queued { capacity: usize },
}

/// Credential service configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Durable user store
    pub user_store: UserStoreConfig,
    /// Token and verification-flag cache
    pub cache: CacheConfig,
    /// Short and remembered session lifetimes
    pub ttl: TtlPolicy,
    /// Last-login propagation strategy
    pub last_login: LastLoginMode,
    /// Argon2 memory cost in KiB (argon2 default when unset)
    pub argon2_memory_kib: Option<u32>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl AuthConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or a value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host: IpAddr = parse_env_or_default("AUTH_HOST", "127.0.0.1")?;
        let port: u16 = parse_env_or_default("AUTH_PORT", "44044")?;

        let user_store = match get_env_or_default("AUTH_USER_STORE", "postgres").as_str() {
            "postgres" => UserStoreConfig::Postgres {
                database_url: get_database_url("AUTH_DATABASE_URL")?,
            },
            "memory" => UserStoreConfig::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "AUTH_USER_STORE".to_string(),
                    format!("expected 'postgres' or 'memory', got '{other}'"),
                ));
            }
        };

        let cache = match get_env_or_default("AUTH_CACHE_BACKEND", "memory").as_str() {
            "memory" => CacheConfig::Memory {
                capacity: parse_env_or_default("AUTH_CACHE_CAPACITY", "100000")?,
            },
            "redis" => CacheConfig::Redis {
                url: get_required_secret("AUTH_REDIS_URL")?,
            },
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "AUTH_CACHE_BACKEND".to_string(),
                    format!("expected 'memory' or 'redis', got '{other}'"),
                ));
            }
        };

        let ttl = TtlPolicy {
            default: Duration::from_secs(parse_env_or_default(
                "AUTH_TOKEN_TTL_SECS",
                &DEFAULT_TOKEN_TTL_SECS.to_string(),
            )?),
            remember_me: Duration::from_secs(parse_env_or_default(
                "AUTH_REMEMBER_ME_TOKEN_TTL_SECS",
                &DEFAULT_REMEMBER_ME_TOKEN_TTL_SECS.to_string(),
            )?),
        };
        validate_ttl_policy(&ttl)?;

        let last_login = parse_last_login_mode(
            &get_env_or_default("AUTH_LAST_LOGIN_MODE", "sync"),
            parse_env_or_default("AUTH_LAST_LOGIN_QUEUE_CAPACITY", "1024")?,
        )?;

        let argon2_memory_kib = get_optional_env("AUTH_ARGON2_MEMORY_KIB")
            .map(|v| {
                v.parse::<u32>().map_err(|e| {
                    ConfigError::InvalidEnvVar("AUTH_ARGON2_MEMORY_KIB".to_string(), e.to_string())
                })
            })
            .transpose()?;

        Ok(Self {
            host,
            port,
            user_store,
            cache,
            ttl,
            last_login,
            argon2_memory_kib,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Load only the database connection string (`AUTH_DATABASE_URL`, falling
/// back to `DATABASE_URL`). Used by tooling that never starts the server.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if neither variable is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    let _ = dotenvy::dotenv();
    get_database_url("AUTH_DATABASE_URL")
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, using `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// The remembered lifetime must be strictly longer than the default one
/// and no longer than a year.
fn validate_ttl_policy(ttl: &TtlPolicy) -> Result<(), ConfigError> {
    if ttl.default.is_zero() {
        return Err(ConfigError::InvalidEnvVar(
            "AUTH_TOKEN_TTL_SECS".to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    if ttl.remember_me <= ttl.default {
        return Err(ConfigError::InvalidEnvVar(
            "AUTH_REMEMBER_ME_TOKEN_TTL_SECS".to_string(),
            format!(
                "must exceed AUTH_TOKEN_TTL_SECS ({}s), got {}s",
                ttl.default.as_secs(),
                ttl.remember_me.as_secs()
            ),
        ));
    }
    if ttl.remember_me > MAX_TTL {
        return Err(ConfigError::InvalidEnvVar(
            "AUTH_REMEMBER_ME_TOKEN_TTL_SECS".to_string(),
            format!(
                "must not exceed {}s, got {}s",
                MAX_TTL.as_secs(),
                ttl.remember_me.as_secs()
            ),
        ));
    }
    Ok(())
}

fn parse_last_login_mode(mode: &str, capacity: usize) -> Result<LastLoginMode, ConfigError> {
    match mode {
        "sync" => Ok(LastLoginMode::Sync),
        "queued" if capacity == 0 => Err(ConfigError::InvalidEnvVar(
            "AUTH_LAST_LOGIN_QUEUE_CAPACITY".to_string(),
            "must be greater than zero".to_string(),
        )),
        "queued" => Ok(LastLoginMode::Queued { capacity }),
        other => Err(ConfigError::InvalidEnvVar(
            "AUTH_LAST_LOGIN_MODE".to_string(),
            format!("expected 'sync' or 'queued', got '{other}'"),
        )),
    }
}
