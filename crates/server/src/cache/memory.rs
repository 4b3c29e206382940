//! moka-backed cache.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};

use super::{CacheError, MAX_TTL, SessionCache};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn new(value: &str, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value: value.to_owned(),
            expires_at: now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Expires each entry at its own deadline.
struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(updated_at))
    }
}

/// Process-local [`SessionCache`].
///
/// moka evicts entries at their deadline; reads also check the deadline so
/// an entry that has expired but not yet been swept is never returned.
///
/// The cache is bounded: once it holds `capacity` entries, moka evicts
/// live ones to make room, which logs those sessions out early. Size
/// `AUTH_CACHE_CAPACITY` above the expected number of live sessions plus
/// verification entries (one per recently active email).
#[derive(Clone)]
pub struct MemoryCache {
    cache: Cache<String, Entry>,
}

impl MemoryCache {
    /// Create a cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryExpiry)
            .build();
        Self { cache }
    }

    async fn live_entry(&self, key: &str) -> Option<Entry> {
        self.cache
            .get(key)
            .await
            .filter(|e| e.is_live(Instant::now()))
    }
}

#[async_trait]
impl SessionCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.live_entry(key).await.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(key.to_owned(), Entry::new(value, ttl))
            .await;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let entry = Entry::new(value, ttl);
        let now = Instant::now();

        // A stale entry still sitting in the map counts as absent.
        let result = self
            .cache
            .entry(key.to_owned())
            .and_compute_with(move |existing| {
                let op = match existing {
                    Some(e) if e.value().is_live(now) => Op::Nop,
                    _ => Op::Put(entry),
                };
                std::future::ready(op)
            })
            .await;

        Ok(matches!(
            result,
            CompResult::Inserted(_) | CompResult::ReplacedWith(_)
        ))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = Instant::now();
        Ok(self
            .live_entry(key)
            .await
            .map(|e| e.expires_at.saturating_duration_since(now)))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
