//! authsvc core - Shared types library.
//!
//! This crate provides the value types shared by the credential service and
//! its tooling:
//! - `server` - The credential and session service (JSON RPC over HTTP)
//! - `cli` - Command-line tools for migrations and user maintenance
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no cache clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for user IDs, emails, session tokens and balances

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
