//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Credential flows (login, register, OAuth upsert, password and email change)
//! - `tokens` - Opaque session token issuance and lookup
//! - `verification` - Read-through cache of the email-verified flag
//! - `password` - Argon2id hashing
//! - `last_login` - Propagation of last-login metadata

pub mod auth;
pub mod last_login;
pub mod password;
pub mod tokens;
pub mod verification;

use std::time::Duration;

use authsvc_core::RememberMe;

pub use auth::{AuthError, AuthService, IssuedToken};
pub use last_login::{LastLoginRecorder, LoginRecord};
pub use password::PasswordHasher;
pub use tokens::TokenStore;
pub use verification::VerificationCache;

/// Session lifetimes.
///
/// `remember_me` must be strictly longer than `default`; configuration
/// loading enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// Lifetime of an ordinary session.
    pub default: Duration,
    /// Lifetime of a remembered session.
    pub remember_me: Duration,
}

impl TtlPolicy {
    /// Pick the lifetime for a session.
    #[must_use]
    pub const fn for_remember(&self, remember: RememberMe) -> Duration {
        if remember.is_on() {
            self.remember_me
        } else {
            self.default
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(60 * 60),
            remember_me: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}
