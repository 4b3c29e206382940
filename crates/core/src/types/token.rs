//! Opaque session token type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`SessionToken`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The input has the wrong length.
    #[error("session token must be exactly {expected} characters")]
    InvalidLength {
        /// Required token length.
        expected: usize,
    },
    /// The input contains a character outside `[A-Za-z0-9]`.
    #[error("session token must be alphanumeric")]
    InvalidCharacter,
}

/// An opaque session token.
///
/// A token carries no structure and no signature. It is a capability: a
/// token is valid exactly as long as the token store holds an entry for it,
/// so revocation is a delete and expiry is the entry's TTL.
///
/// ## Constraints
///
/// - Exactly 32 characters
/// - Every character is ASCII alphanumeric
///
/// ## Examples
///
/// ```
/// use authsvc_core::SessionToken;
///
/// assert!(SessionToken::parse("Ab3dEf7hIj1lMn5pQr9tUv2xYz4bCd6f").is_ok());
/// assert!(SessionToken::parse("too-short").is_err());
/// ```
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Length of every issued token.
    pub const LENGTH: usize = 32;

    /// Parse a `SessionToken` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not 32 ASCII alphanumeric characters.
    pub fn parse(s: &str) -> Result<Self, TokenError> {
        if s.len() != Self::LENGTH {
            return Err(TokenError::InvalidLength {
                expected: Self::LENGTH,
            });
        }

        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(TokenError::InvalidCharacter);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

// Tokens are bearer credentials; keep them out of debug output and logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.0.get(..4).unwrap_or("");
        write!(f, "SessionToken({prefix}…)")
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
