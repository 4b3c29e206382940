//! CLI subcommands.

pub mod migrate;
pub mod user;

use sqlx::PgPool;
use thiserror::Error;

use authsvc_server::config::{self, ConfigError};
use authsvc_server::db::{self as store, RepositoryError};

/// Errors shared by every subcommand.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] authsvc_core::EmailError),

    #[error("No user with email: {0}")]
    UserNotFound(String),
}

/// Connect to the database named by `AUTH_DATABASE_URL`.
async fn connect() -> Result<PgPool, CommandError> {
    let database_url = config::database_url_from_env()?;
    tracing::info!("Connecting to database...");
    Ok(store::create_pool(&database_url).await?)
}
