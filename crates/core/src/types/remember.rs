//! "Remember me" session preference.

use serde::{Deserialize, Serialize};

/// Whether the caller asked for a persistent session.
///
/// Callers send the flag as the string `"on"` or `"off"`. Anything other
/// than `"on"` selects the short session lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RememberMe {
    /// Short-lived session.
    #[default]
    Off,
    /// Long-lived ("remembered") session.
    On,
}

impl RememberMe {
    /// Interpret the wire flag.
    #[must_use]
    pub fn from_flag(flag: &str) -> Self {
        if flag.eq_ignore_ascii_case("on") {
            Self::On
        } else {
            Self::Off
        }
    }

    /// Returns `true` for a remembered session.
    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for RememberMe {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}
