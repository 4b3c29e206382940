//! Database migration command.
//!
//! Applies `crates/server/migrations/` to the database named by
//! `AUTH_DATABASE_URL` (or `DATABASE_URL`). The server never migrates on
//! startup.

use super::{CommandError, connect};

/// Run all pending migrations.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
