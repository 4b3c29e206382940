//! `PostgreSQL` user store.
//!
//! Queries are checked at runtime (`query_as` + `FromRow`) so the crate
//! builds without a live database or an offline query cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use authsvc_core::{Balance, Email, UserId};

use super::{RepositoryError, UserStore};
use crate::models::User;

macro_rules! user_columns {
    () => {
        "id, email, password_hash, email_verified, ip_created, last_login_ip, \
         last_login_at, balance, version, created_at, updated_at"
    };
}

/// Row shape of `auth.users`.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    email: String,
    password_hash: Vec<u8>,
    email_verified: bool,
    ip_created: String,
    last_login_ip: String,
    last_login_at: DateTime<Utc>,
    balance: Decimal,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&r.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(r.id),
            email,
            password_hash: r.password_hash,
            email_verified: r.email_verified,
            ip_created: r.ip_created,
            last_login_ip: r.last_login_ip,
            last_login_at: r.last_login_at,
            balance: Balance::new(r.balance),
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Map a unique-index violation on `email` to `RepositoryError::Conflict`.
fn email_conflict(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict("email already exists".to_owned());
    }
    RepositoryError::Database(e)
}

/// User store backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new user store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(
        &self,
        email: &Email,
        ip: &str,
        password_hash: &[u8],
        email_verified: bool,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "INSERT INTO auth.users (email, password_hash, email_verified, ip_created, last_login_ip) ",
            "VALUES ($1, $2, $3, $4, $4) ",
            "RETURNING ",
            user_columns!()
        ))
        .bind(email)
        .bind(password_hash)
        .bind(email_verified)
        .bind(ip)
        .fetch_one(&self.pool)
        .await
        .map_err(email_conflict)?;

        row.try_into()
    }

    async fn get_user(&self, email: &Email) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM auth.users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn update_user(&self, user: &User) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "UPDATE auth.users SET ",
            "email = $3, password_hash = $4, email_verified = $5, ip_created = $6, ",
            "last_login_ip = $7, last_login_at = $8, balance = $9, ",
            "version = version + 1, updated_at = NOW() ",
            "WHERE id = $1 AND version = $2 ",
            "RETURNING ",
            user_columns!()
        ))
        .bind(user.id)
        .bind(user.version)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.email_verified)
        .bind(&user.ip_created)
        .bind(&user.last_login_ip)
        .bind(user.last_login_at)
        .bind(user.balance.amount())
        .fetch_optional(&self.pool)
        .await
        .map_err(email_conflict)?;

        if let Some(row) = row {
            return row.try_into();
        }

        // Nothing matched: either the row is gone or its version moved on.
        let exists = sqlx::query_scalar::<_, i32>("SELECT id FROM auth.users WHERE id = $1")
            .bind(user.id)
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Err(RepositoryError::VersionMismatch {
                id: user.id,
                expected: user.version,
            }),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn record_login(
        &self,
        id: UserId,
        ip: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE auth.users SET last_login_ip = $2, last_login_at = $3, \
             version = version + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(ip)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn email_verified(&self, email: &Email) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>("SELECT email_verified FROM auth.users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn email_verify(&self, email: &Email) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE auth.users SET email_verified = TRUE, version = version + 1, updated_at = NOW() \
             WHERE email = $1",
        )
        .bind(email)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn delete_user(&self, email: &Email) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM auth.users WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
