//! Credential and session service.
//!
//! Authenticates users, issues and revokes opaque session tokens, tracks
//! email verification and federates third-party identities into the same
//! user record. Exposed as a library so the binary, the CLI and the
//! integration tests share one wiring.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod rpc;
pub mod services;
pub mod startup;
pub mod state;

pub use startup::{StartupError, build_state, router};
