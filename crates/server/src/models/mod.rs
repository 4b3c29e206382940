//! Domain models for the credential service.

pub mod user;

pub use user::User;
