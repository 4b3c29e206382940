//! Core types for authsvc.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod balance;
pub mod email;
pub mod id;
pub mod remember;
pub mod token;

pub use balance::Balance;
pub use email::{Email, EmailError};
pub use id::*;
pub use remember::RememberMe;
pub use token::{SessionToken, TokenError};
