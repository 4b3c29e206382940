//! Process-local user store.
//!
//! Mirrors the `PostgreSQL` semantics (unique email, versioned updates) so
//! the service behaves identically against either backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use authsvc_core::{Balance, Email, UserId};

use super::{RepositoryError, UserStore};
use crate::models::User;

#[derive(Default)]
struct Inner {
    next_id: i32,
    by_id: HashMap<UserId, User>,
    by_email: HashMap<Email, UserId>,
}

impl Inner {
    fn find(&self, email: &Email) -> Option<&User> {
        self.by_email.get(email).and_then(|id| self.by_id.get(id))
    }

    fn find_mut(&mut self, email: &Email) -> Option<&mut User> {
        let id = *self.by_email.get(email)?;
        self.by_id.get_mut(&id)
    }
}

/// In-memory [`UserStore`] guarded by a single `RwLock`.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    /// Whether the store holds no users.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(
        &self,
        email: &Email,
        ip: &str,
        password_hash: &[u8],
        email_verified: bool,
    ) -> Result<User, RepositoryError> {
        let mut inner = self.inner.write().await;
        if inner.by_email.contains_key(email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        inner.next_id += 1;
        let id = UserId::new(inner.next_id);
        let now = Utc::now();
        let user = User {
            id,
            email: email.clone(),
            password_hash: password_hash.to_vec(),
            email_verified,
            ip_created: ip.to_owned(),
            last_login_ip: ip.to_owned(),
            last_login_at: now,
            balance: Balance::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        inner.by_email.insert(email.clone(), id);
        inner.by_id.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, email: &Email) -> Result<User, RepositoryError> {
        self.inner
            .read()
            .await
            .find(email)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_user(&self, user: &User) -> Result<User, RepositoryError> {
        let mut inner = self.inner.write().await;

        let current = inner.by_id.get(&user.id).ok_or(RepositoryError::NotFound)?;
        if current.version != user.version {
            return Err(RepositoryError::VersionMismatch {
                id: user.id,
                expected: user.version,
            });
        }

        let old_email = current.email.clone();
        if old_email != user.email {
            if inner.by_email.contains_key(&user.email) {
                return Err(RepositoryError::Conflict("email already exists".to_owned()));
            }
            inner.by_email.remove(&old_email);
            inner.by_email.insert(user.email.clone(), user.id);
        }

        let mut stored = user.clone();
        stored.version += 1;
        stored.updated_at = Utc::now();
        inner.by_id.insert(user.id, stored.clone());
        Ok(stored)
    }

    async fn record_login(
        &self,
        id: UserId,
        ip: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        let user = inner.by_id.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        ip.clone_into(&mut user.last_login_ip);
        user.last_login_at = at;
        user.version += 1;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn email_verified(&self, email: &Email) -> Result<bool, RepositoryError> {
        self.inner
            .read()
            .await
            .find(email)
            .map(|u| u.email_verified)
            .ok_or(RepositoryError::NotFound)
    }

    async fn email_verify(&self, email: &Email) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        let user = inner.find_mut(email).ok_or(RepositoryError::NotFound)?;
        user.email_verified = true;
        user.version += 1;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_user(&self, email: &Email) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        let Some(id) = inner.by_email.remove(email) else {
            return Ok(false);
        };
        inner.by_id.remove(&id);
        Ok(true)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
