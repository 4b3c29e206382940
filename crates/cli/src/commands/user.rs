//! Account maintenance commands.
//!
//! These talk to `PostgreSQL` directly. Cached verification flags in Redis
//! are not touched; they expire within 24 hours.

use authsvc_core::Email;
use authsvc_server::db::{PgUserStore, RepositoryError, UserStore};

use super::{CommandError, connect};

async fn store() -> Result<PgUserStore, CommandError> {
    Ok(PgUserStore::new(connect().await?))
}

/// Print a user record without its password hash.
pub async fn show(email: &str) -> Result<(), CommandError> {
    let email = Email::parse(email)?;
    let user = store()
        .await?
        .get_user(&email)
        .await
        .map_err(|e| not_found(e, &email))?;

    #[allow(clippy::print_stdout)]
    {
        println!("id:             {}", user.id);
        println!("email:          {}", user.email);
        println!("email_verified: {}", user.email_verified);
        println!("has_password:   {}", user.has_password());
        println!("ip_created:     {}", user.ip_created);
        println!("last_login_ip:  {}", user.last_login_ip);
        println!("last_login_at:  {}", user.last_login_at);
        println!("balance:        {}", user.balance);
        println!("version:        {}", user.version);
        println!("created_at:     {}", user.created_at);
        println!("updated_at:     {}", user.updated_at);
    }

    Ok(())
}

/// Mark a user's email as verified.
pub async fn verify(email: &str) -> Result<(), CommandError> {
    let email = Email::parse(email)?;
    store()
        .await?
        .email_verify(&email)
        .await
        .map_err(|e| not_found(e, &email))?;

    tracing::info!("Marked {} as verified", email);
    Ok(())
}

/// Delete a user.
pub async fn delete(email: &str) -> Result<(), CommandError> {
    let email = Email::parse(email)?;
    if !store().await?.delete_user(&email).await? {
        return Err(CommandError::UserNotFound(email.into_inner()));
    }

    tracing::warn!("Deleted user {}", email);
    Ok(())
}

fn not_found(e: RepositoryError, email: &Email) -> CommandError {
    match e {
        RepositoryError::NotFound => CommandError::UserNotFound(email.to_string()),
        other => CommandError::Repository(other),
    }
}
