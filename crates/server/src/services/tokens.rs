//! Opaque session tokens.
//!
//! A token is 32 random alphanumeric characters stored under
//! `session:{token}` with the owner's email as the value. Presence is the
//! only proof of validity; revocation deletes the key and expiry is the
//! key's TTL.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{debug, warn};

use authsvc_core::{Email, SessionToken};

use crate::cache::{CacheError, SessionCache};

/// Candidates tried before giving up on a collision streak.
pub const MAX_ATTEMPTS: usize = 5;

const KEY_PREFIX: &str = "session:";

/// Produces candidate token strings.
pub type TokenGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Draw a token uniformly from `[A-Za-z0-9]{32}`.
#[must_use]
pub fn random_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SessionToken::LENGTH)
        .map(char::from)
        .collect()
}

fn key(token: &SessionToken) -> String {
    format!("{KEY_PREFIX}{token}")
}

/// Token index over a [`SessionCache`].
#[derive(Clone)]
pub struct TokenStore {
    cache: Arc<dyn SessionCache>,
    generate: TokenGenerator,
}

impl TokenStore {
    /// Token store drawing random tokens.
    #[must_use]
    pub fn new(cache: Arc<dyn SessionCache>) -> Self {
        Self::with_generator(cache, Arc::new(random_token))
    }

    /// Token store with a custom candidate source.
    #[must_use]
    pub fn with_generator(cache: Arc<dyn SessionCache>, generate: TokenGenerator) -> Self {
        Self { cache, generate }
    }

    /// Mint a token for `email` that lives for `ttl`.
    ///
    /// Each candidate is written with set-if-absent, so two concurrent
    /// callers can never be handed the same token. Returns `None` when
    /// every candidate collided with a live token.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the backend fails.
    pub async fn create_token(
        &self,
        email: &Email,
        ttl: Duration,
    ) -> Result<Option<SessionToken>, CacheError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let Ok(token) = SessionToken::parse(&(self.generate)()) else {
                warn!(attempt, "token generator produced a malformed candidate");
                continue;
            };

            if self
                .cache
                .set_if_absent(&key(&token), email.as_str(), ttl)
                .await?
            {
                return Ok(Some(token));
            }
            debug!(attempt, "token collision, retrying");
        }

        warn!(attempts = MAX_ATTEMPTS, "could not mint a unique token");
        Ok(None)
    }

    /// Resolve a token to the email it was issued for.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the backend fails.
    pub async fn get_email(&self, token: &SessionToken) -> Result<Option<Email>, CacheError> {
        let Some(value) = self.cache.get(&key(token)).await? else {
            return Ok(None);
        };

        match Email::parse(&value) {
            Ok(email) => Ok(Some(email)),
            Err(e) => {
                warn!(error = %e, "session entry holds an invalid email, ignoring");
                Ok(None)
            }
        }
    }

    /// Revoke a token. Revoking an unknown token succeeds.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the backend fails.
    pub async fn delete_token(&self, token: &SessionToken) -> Result<(), CacheError> {
        self.cache.delete(&key(token)).await
    }

    /// Remaining lifetime of a token.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the backend fails.
    pub async fn get_ttl(&self, token: &SessionToken) -> Result<Option<Duration>, CacheError> {
        self.cache.ttl(&key(token)).await
    }
}
