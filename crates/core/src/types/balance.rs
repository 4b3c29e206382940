//! Account balance using decimal arithmetic.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Monetary balance carried on a user record.
///
/// Legacy field: the credential flows never read or change it, but it is
/// persisted and round-tripped by full-record updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Balance(Decimal);

impl Balance {
    /// A zero balance.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new balance.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Get the underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Balance {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}
