//! Durable user store.
//!
//! # Database: `authsvc`
//!
//! ## Tables
//!
//! - `auth.users` - User identity records (unique index on `email`)
//!
//! # Backends
//!
//! The [`UserStore`] trait is the capability set the credential service
//! depends on. Two backends implement it and one is picked at startup:
//!
//! - [`PgUserStore`] - `PostgreSQL` via sqlx
//! - [`MemoryUserStore`] - process-local, for development and tests
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p authsvc-cli -- migrate
//! ```

pub mod memory;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use authsvc_core::{Email, UserId};

use crate::models::User;

pub use memory::MemoryUserStore;
pub use users::PgUserStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A full-record update was based on a stale read.
    #[error("user {id} was modified concurrently (expected version {expected})")]
    VersionMismatch {
        /// The user whose row moved on.
        id: UserId,
        /// The version the caller read.
        expected: i32,
    },
}

/// Capability set of the durable user store.
///
/// Rows are last-writer-wins except for [`UserStore::update_user`], which
/// compares the row version so that password hash and email are never
/// overwritten from a stale read.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    async fn create_user(
        &self,
        email: &Email,
        ip: &str,
        password_hash: &[u8],
        email_verified: bool,
    ) -> Result<User, RepositoryError>;

    /// Get a user by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no user has this email.
    async fn get_user(&self, email: &Email) -> Result<User, RepositoryError>;

    /// Write every mutable field of `user`, keyed by `user.id`.
    ///
    /// Succeeds only if the stored row still has `user.version`; the
    /// returned record carries the bumped version. Every other write also
    /// bumps the version, so a record read before one of them is stale.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the row is gone,
    /// `RepositoryError::VersionMismatch` if it changed since it was read, and
    /// `RepositoryError::Conflict` if the new email belongs to another user.
    async fn update_user(&self, user: &User) -> Result<User, RepositoryError>;

    /// Update only the last-login fields and bump the version.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    async fn record_login(
        &self,
        id: UserId,
        ip: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Read only the verification flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no user has this email.
    async fn email_verified(&self, email: &Email) -> Result<bool, RepositoryError>;

    /// Mark a user's email as verified and bump the version.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no user has this email.
    async fn email_verify(&self, email: &Email) -> Result<(), RepositoryError>;

    /// Delete a user by email.
    ///
    /// Returns `true` if a row was removed, `false` if it didn't exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    async fn delete_user(&self, email: &Email) -> Result<bool, RepositoryError>;

    /// Check that the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the store cannot serve queries.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
