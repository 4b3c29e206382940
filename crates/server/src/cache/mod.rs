//! Volatile key/value cache with per-key expiry.
//!
//! Holds two key spaces:
//!
//! ```text
//! session:{token}        → email         (token TTL)
//! emailVerified:{email}  → "true"/"false" (24 hours)
//! ```
//!
//! One backend is picked at startup:
//!
//! - [`MemoryCache`] - moka, process-local
//! - [`RedisCache`] - shared Redis via a multiplexed connection manager

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Longest lifetime any entry is stored with; longer TTLs are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Errors from a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis command or connection failure.
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Backend cannot serve requests.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Key/value operations the token store and verification cache need.
///
/// Every write carries a TTL; keys disappear on their own once it elapses.
/// An expired key must read as absent even if the backend has not swept it.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a value unconditionally, replacing any previous TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Write a value only if `key` is absent. Returns whether it was written.
    ///
    /// Atomic per key: of two concurrent callers, at most one sees `true`.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remaining lifetime of a key, `None` if it is absent.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), CacheError>;
}
