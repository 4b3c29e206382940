//! User domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};

use authsvc_core::{Balance, Email, UserId};

/// A user identity record (domain type).
///
/// Created on registration or first OAuth login. The credential flows never
/// delete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID, assigned by the store.
    pub id: UserId,
    /// User's email address (unique, case-sensitive).
    pub email: Email,
    /// Argon2 PHC string as bytes; empty for federated-only accounts.
    pub password_hash: Vec<u8>,
    /// Whether the email has been verified.
    pub email_verified: bool,
    /// IP address the account was created from.
    pub ip_created: String,
    /// IP address of the most recent login.
    pub last_login_ip: String,
    /// When the most recent login happened.
    pub last_login_at: DateTime<Utc>,
    /// Legacy account balance.
    pub balance: Balance,
    /// Row version, bumped by every full-record update.
    pub version: i32,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the account can log in with a password.
    #[must_use]
    pub const fn has_password(&self) -> bool {
        !self.password_hash.is_empty()
    }
}
