//! Argon2id password hashing.
//!
//! Hashes are PHC strings (`$argon2id$v=19$...`) stored as bytes. An empty
//! hash marks a federated-only account and never verifies.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};

/// Argon2id hasher with fixed cost parameters.
#[derive(Clone, Default)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Hasher with explicit cost parameters.
    #[must_use]
    pub fn with_params(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Hasher with the default time and parallelism cost and a custom
    /// memory cost.
    ///
    /// # Errors
    ///
    /// Returns `argon2::Error` if `memory_kib` is out of range.
    pub fn with_memory_kib(memory_kib: u32) -> Result<Self, argon2::Error> {
        let params = Params::new(
            memory_kib,
            Params::DEFAULT_T_COST,
            Params::DEFAULT_P_COST,
            None,
        )?;
        Ok(Self::with_params(params))
    }

    /// Hash a password with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns `password_hash::Error` if hashing fails.
    pub fn hash(&self, password: &str) -> Result<Vec<u8>, password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self.argon2.hash_password(password.as_bytes(), &salt)?;
        Ok(hash.to_string().into_bytes())
    }

    /// Check a password against a stored hash.
    ///
    /// Empty or unparseable hashes never match.
    #[must_use]
    pub fn verify(&self, password: &str, stored: &[u8]) -> bool {
        if stored.is_empty() {
            return false;
        }
        let Ok(encoded) = std::str::from_utf8(stored) else {
            return false;
        };
        let Ok(parsed) = PasswordHash::new(encoded) else {
            return false;
        };

        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
