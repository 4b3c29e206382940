//! Read-through cache of the email-verified flag.
//!
//! Entries live under `emailVerified:{email}` for 24 hours. The user store
//! is authoritative; a missing, unreadable or stale-format entry is
//! resolved by asking the store and writing the answer back.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use authsvc_core::Email;

use crate::cache::{CacheError, SessionCache};
use crate::db::{RepositoryError, UserStore};

/// Lifetime of a cached verification flag.
pub const VERIFICATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const KEY_PREFIX: &str = "emailVerified:";

fn key(email: &Email) -> String {
    format!("{KEY_PREFIX}{email}")
}

/// Verification flag cache backed by a [`UserStore`].
#[derive(Clone)]
pub struct VerificationCache {
    cache: Arc<dyn SessionCache>,
    users: Arc<dyn UserStore>,
}

impl VerificationCache {
    #[must_use]
    pub fn new(cache: Arc<dyn SessionCache>, users: Arc<dyn UserStore>) -> Self {
        Self { cache, users }
    }

    /// Whether `email` is verified.
    ///
    /// Cache failures fall back to the store; backfill failures are logged.
    ///
    /// # Errors
    ///
    /// Returns the store error, `RepositoryError::NotFound` for an unknown
    /// email.
    pub async fn get(&self, email: &Email) -> Result<bool, RepositoryError> {
        match self.cache.get(&key(email)).await {
            Ok(Some(value)) => match value.as_str() {
                "true" => return Ok(true),
                "false" => return Ok(false),
                other => warn!(%email, value = other, "unexpected verification entry"),
            },
            Ok(None) => debug!(%email, "verification cache miss"),
            Err(e) => warn!(%email, error = %e, "verification cache read failed"),
        }

        let verified = self.users.email_verified(email).await?;

        if let Err(e) = self.set(email, verified).await {
            warn!(%email, error = %e, "verification cache backfill failed");
        }

        Ok(verified)
    }

    /// Overwrite the cached flag with a fresh TTL.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the backend fails.
    pub async fn set(&self, email: &Email, verified: bool) -> Result<(), CacheError> {
        let value = if verified { "true" } else { "false" };
        self.cache.set(&key(email), value, VERIFICATION_TTL).await
    }

    /// Drop the cached flag.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the backend fails.
    pub async fn invalidate(&self, email: &Email) -> Result<(), CacheError> {
        self.cache.delete(&key(email)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::MemoryUserStore;

    /// Cache whose every call fails.
    struct DownCache;

    #[async_trait]
    impl SessionCache for DownCache {
        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn delete(&self, _: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn ttl(&self, _: &str) -> Result<Option<Duration>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn ping(&self) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    async fn users_with(addr: &str, verified: bool) -> Arc<MemoryUserStore> {
        let users = Arc::new(MemoryUserStore::new());
        users
            .create_user(&email(addr), "", b"", verified)
            .await
            .unwrap();
        users
    }

    #[tokio::test]
    async fn test_miss_reads_store_and_backfills() {
        let cache = Arc::new(MemoryCache::new(100));
        let users = users_with("a@x.com", true).await;
        let verification = VerificationCache::new(cache.clone(), users);

        assert!(verification.get(&email("a@x.com")).await.unwrap());
        assert_eq!(
            cache.get("emailVerified:a@x.com").await.unwrap().as_deref(),
            Some("true")
        );

        let ttl = cache.ttl("emailVerified:a@x.com").await.unwrap().unwrap();
        assert!(ttl > VERIFICATION_TTL - Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_hit_does_not_consult_store() {
        let cache = Arc::new(MemoryCache::new(100));
        let users = users_with("a@x.com", false).await;
        let verification = VerificationCache::new(cache, users);

        verification.set(&email("a@x.com"), true).await.unwrap();
        // cache says true even though the store still says false
        assert!(verification.get(&email("a@x.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_email_is_not_found() {
        let verification = VerificationCache::new(
            Arc::new(MemoryCache::new(100)),
            Arc::new(MemoryUserStore::new()),
        );
        assert!(matches!(
            verification.get(&email("nobody@x.com")).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_cache_outage_falls_back_to_store() {
        let users = users_with("a@x.com", true).await;
        let verification = VerificationCache::new(Arc::new(DownCache), users);

        assert!(verification.get(&email("a@x.com")).await.unwrap());
        assert!(verification.set(&email("a@x.com"), true).await.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_forces_store_read() {
        let cache = Arc::new(MemoryCache::new(100));
        let users = users_with("a@x.com", false).await;
        let verification = VerificationCache::new(cache, users.clone());

        assert!(!verification.get(&email("a@x.com")).await.unwrap());
        users.email_verify(&email("a@x.com")).await.unwrap();
        // still the cached answer
        assert!(!verification.get(&email("a@x.com")).await.unwrap());

        verification.invalidate(&email("a@x.com")).await.unwrap();
        assert!(verification.get(&email("a@x.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_garbage_entry_is_replaced() {
        let cache = Arc::new(MemoryCache::new(100));
        let users = users_with("a@x.com", true).await;
        let verification = VerificationCache::new(cache.clone(), users);

        cache
            .set("emailVerified:a@x.com", "1", VERIFICATION_TTL)
            .await
            .unwrap();
        assert!(verification.get(&email("a@x.com")).await.unwrap());
        assert_eq!(
            cache.get("emailVerified:a@x.com").await.unwrap().as_deref(),
            Some("true")
        );
    }
}
