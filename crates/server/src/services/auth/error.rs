//! Credential service error types.

use thiserror::Error;

use crate::cache::CacheError;
use crate::db::RepositoryError;

/// Errors that can occur during credential operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password. The two are deliberately
    /// indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Registration or email change hit an existing account.
    #[error("user already exists")]
    UserExists,

    /// User not found.
    #[error("user not found")]
    NotFound,

    /// Every token candidate collided with a live session.
    #[error("failed to generate a unique session token")]
    TokenGenerationFailed,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Token or verification cache error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
