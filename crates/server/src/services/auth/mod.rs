//! Credential service.
//!
//! Owns the session lifecycle: anonymous callers become authenticated by
//! login, registration or an OAuth assertion and go back to anonymous on
//! logout, credential change or token expiry. Password and email changes
//! re-authenticate: they mint a fresh token and revoke the presented one.

mod error;

pub use error::AuthError;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use authsvc_core::{Email, RememberMe, SessionToken};

use super::last_login::{LastLoginRecorder, LoginRecord};
use super::password::PasswordHasher;
use super::tokens::TokenStore;
use super::verification::VerificationCache;
use super::TtlPolicy;
use crate::cache::SessionCache;
use crate::db::{RepositoryError, UserStore};
use crate::models::User;

/// Read-modify-write attempts for a versioned user update.
const UPDATE_ATTEMPTS: u32 = 3;

/// A freshly minted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: SessionToken,
    pub ttl: Duration,
}

/// Credential service.
///
/// Cheap to clone; every collaborator is shared.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: TokenStore,
    verification: VerificationCache,
    hasher: PasswordHasher,
    last_login: LastLoginRecorder,
    ttl: TtlPolicy,
}

impl AuthService {
    /// Create a credential service over a user store and a cache.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        cache: Arc<dyn SessionCache>,
        hasher: PasswordHasher,
        last_login: LastLoginRecorder,
        ttl: TtlPolicy,
    ) -> Self {
        Self {
            tokens: TokenStore::new(Arc::clone(&cache)),
            verification: VerificationCache::new(cache, Arc::clone(&users)),
            users,
            hasher,
            last_login,
            ttl,
        }
    }

    /// Replace the token store (e.g. to control token generation).
    #[must_use]
    pub fn with_token_store(mut self, tokens: TokenStore) -> Self {
        self.tokens = tokens;
        self
    }

    /// Session lifetimes in effect.
    #[must_use]
    pub const fn ttl_policy(&self) -> TtlPolicy {
        self.ttl
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Log in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email, a wrong
    /// password or a federated-only account.
    #[instrument(skip_all, fields(op = "login", email = %email, ip = %ip))]
    pub async fn login(
        &self,
        email: &Email,
        password: &str,
        ip: &str,
        remember: RememberMe,
    ) -> Result<IssuedToken, AuthError> {
        let user = self.user_for_credentials(email).await?;

        if !self.hasher.verify(password, &user.password_hash) {
            info!("password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        self.last_login
            .record(LoginRecord::now(user.id, ip))
            .await
            .map_err(|e| {
                error!(error = %e, "failed to record login");
                AuthError::from(e)
            })?;

        let issued = self.issue(email, self.ttl.for_remember(remember)).await?;
        info!("user logged in");
        Ok(issued)
    }

    /// Register a new account and log it in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserExists` if the email is taken; no token is
    /// minted in that case.
    #[instrument(skip_all, fields(op = "register", email = %email, ip = %ip))]
    pub async fn register(
        &self,
        email: &Email,
        password: &str,
        ip: &str,
        remember: RememberMe,
    ) -> Result<IssuedToken, AuthError> {
        let hash = self.hasher.hash(password).map_err(|e| {
            error!(error = %e, "password hashing failed");
            AuthError::PasswordHash
        })?;

        self.users
            .create_user(email, ip, &hash, false)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => {
                    info!("email already registered");
                    AuthError::UserExists
                }
                other => {
                    error!(error = %other, "failed to create user");
                    AuthError::Repository(other)
                }
            })?;

        if let Err(e) = self.verification.set(email, false).await {
            warn!(error = %e, "failed to seed verification cache");
        }

        let issued = self.issue(email, self.ttl.for_remember(remember)).await?;
        info!("user registered");
        Ok(issued)
    }

    /// Log in through a federated identity, creating the account on first
    /// sight. The identity provider has verified the address, so the
    /// account is marked verified either way.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` or `AuthError::Cache` on backend
    /// failure.
    #[instrument(skip_all, fields(op = "oauth", email = %email, ip = %ip))]
    pub async fn oauth(&self, email: &Email, ip: &str) -> Result<IssuedToken, AuthError> {
        match self.users.get_user(email).await {
            Ok(user) => self.verify_and_record(&user, ip).await?,
            Err(RepositoryError::NotFound) => {
                match self.users.create_user(email, ip, &[], true).await {
                    Ok(_) => info!("federated account created"),
                    Err(RepositoryError::Conflict(_)) => {
                        // Lost a creation race; the winner's row exists now.
                        debug!("concurrent federated signup, using existing account");
                        let user = self.users.get_user(email).await?;
                        self.verify_and_record(&user, ip).await?;
                    }
                    Err(e) => {
                        error!(error = %e, "failed to create federated account");
                        return Err(e.into());
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "failed to look up user");
                return Err(e.into());
            }
        }

        if let Err(e) = self.verification.set(email, true).await {
            warn!(error = %e, "failed to write verification cache");
        }

        let issued = self.issue(email, self.ttl.remember_me).await?;
        info!("federated login");
        Ok(issued)
    }

    /// Revoke a session. Unknown and malformed tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Cache` if the token store fails.
    #[instrument(skip_all, fields(op = "logout"))]
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let Ok(token) = SessionToken::parse(token) else {
            debug!("logout with malformed token");
            return Ok(());
        };

        self.tokens.delete_token(&token).await.map_err(|e| {
            error!(error = %e, "failed to delete token");
            AuthError::from(e)
        })?;
        info!("user logged out");
        Ok(())
    }

    // =========================================================================
    // Credential changes
    // =========================================================================

    /// Replace the password and rotate the presented session.
    ///
    /// Other sessions of the same user stay valid.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email.
    #[instrument(skip_all, fields(op = "change_password", email = %email, ip = %ip))]
    pub async fn change_password(
        &self,
        email: &Email,
        new_password: &str,
        ip: &str,
        old_token: &str,
    ) -> Result<IssuedToken, AuthError> {
        let hash = self.hasher.hash(new_password).map_err(|e| {
            error!(error = %e, "password hashing failed");
            AuthError::PasswordHash
        })?;

        self.update_with_retry(email, |user| {
            user.password_hash.clone_from(&hash);
            ip.clone_into(&mut user.last_login_ip);
        })
        .await?;

        let issued = self.issue(email, self.ttl.remember_me).await?;
        self.revoke_quietly(old_token).await;

        info!("password changed");
        Ok(issued)
    }

    /// Move the account to a new email and rotate the presented session.
    ///
    /// Cached verification state for both addresses is dropped so the next
    /// read comes from the store.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email and
    /// `AuthError::UserExists` if `new_email` belongs to another account.
    #[instrument(skip_all, fields(op = "change_email", email = %email, new_email = %new_email))]
    pub async fn change_email(
        &self,
        email: &Email,
        new_email: &Email,
        old_token: &str,
    ) -> Result<IssuedToken, AuthError> {
        self.update_with_retry(email, |user| user.email.clone_from(new_email))
            .await?;

        let issued = self.issue(new_email, self.ttl.remember_me).await?;
        self.revoke_quietly(old_token).await;

        if let Err(e) = self.verification.invalidate(email).await {
            error!(error = %e, "failed to invalidate verification cache for old email");
        }
        if let Err(e) = self.verification.invalidate(new_email).await {
            warn!(error = %e, "failed to invalidate verification cache for new email");
        }

        info!("email changed");
        Ok(issued)
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Mark an email as verified.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` for an unknown email.
    #[instrument(skip_all, fields(op = "email_verify", email = %email))]
    pub async fn email_verify(&self, email: &Email) -> Result<(), AuthError> {
        self.users.email_verify(email).await.map_err(|e| match e {
            RepositoryError::NotFound => AuthError::NotFound,
            other => {
                error!(error = %other, "failed to verify email");
                AuthError::Repository(other)
            }
        })?;

        if let Err(e) = self.verification.set(email, true).await {
            error!(error = %e, "failed to write verification cache");
            // A stale `false` must not outlive the store update.
            if let Err(e) = self.verification.invalidate(email).await {
                warn!(error = %e, "failed to invalidate verification cache");
            }
        }

        info!("email verified");
        Ok(())
    }

    /// Whether an email is verified.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` for an unknown email.
    #[instrument(skip_all, fields(op = "email_verified", email = %email))]
    pub async fn email_verified(&self, email: &Email) -> Result<bool, AuthError> {
        self.verification.get(email).await.map_err(|e| match e {
            RepositoryError::NotFound => AuthError::NotFound,
            other => {
                error!(error = %other, "failed to read verification state");
                AuthError::Repository(other)
            }
        })
    }

    // =========================================================================
    // Session introspection
    // =========================================================================

    /// Mint a session for `email` without checking credentials.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenGenerationFailed` or `AuthError::Cache`.
    #[instrument(skip_all, fields(op = "create_token", email = %email))]
    pub async fn create_token(
        &self,
        email: &Email,
        remember: RememberMe,
    ) -> Result<IssuedToken, AuthError> {
        self.issue(email, self.ttl.for_remember(remember)).await
    }

    /// Email a token was issued for, `None` if the token is empty, malformed,
    /// revoked or expired.
    ///
    /// Cache failures are logged and read as `None`.
    #[instrument(skip_all, fields(op = "get_user_email"))]
    pub async fn get_user_email(&self, token: &str) -> Option<Email> {
        let token = parse_presented(token)?;
        match self.tokens.get_email(&token).await {
            Ok(email) => email,
            Err(e) => {
                error!(error = %e, "failed to resolve token");
                None
            }
        }
    }

    /// Remaining lifetime of a session, `None` if it is not live.
    ///
    /// Cache failures are logged and read as `None`.
    #[instrument(skip_all, fields(op = "token_ttl"))]
    pub async fn token_ttl(&self, token: &str) -> Option<Duration> {
        let token = parse_presented(token)?;
        match self.tokens.get_ttl(&token).await {
            Ok(ttl) => ttl,
            Err(e) => {
                error!(error = %e, "failed to read token ttl");
                None
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn user_for_credentials(&self, email: &Email) -> Result<User, AuthError> {
        match self.users.get_user(email).await {
            Ok(user) => Ok(user),
            Err(RepositoryError::NotFound) => {
                info!("unknown email");
                Err(AuthError::InvalidCredentials)
            }
            Err(e) => {
                error!(error = %e, "failed to look up user");
                Err(e.into())
            }
        }
    }

    async fn issue(&self, email: &Email, ttl: Duration) -> Result<IssuedToken, AuthError> {
        match self.tokens.create_token(email, ttl).await {
            Ok(Some(token)) => Ok(IssuedToken { token, ttl }),
            Ok(None) => {
                error!("token generation exhausted its attempts");
                Err(AuthError::TokenGenerationFailed)
            }
            Err(e) => {
                error!(error = %e, "failed to store token");
                Err(e.into())
            }
        }
    }

    async fn verify_and_record(&self, user: &User, ip: &str) -> Result<(), AuthError> {
        self.users.email_verify(&user.email).await?;
        self.last_login
            .record(LoginRecord::now(user.id, ip))
            .await?;
        Ok(())
    }

    /// Apply `change` to the current row and write it back, re-reading and
    /// re-applying if another writer got there first.
    async fn update_with_retry<F>(&self, email: &Email, change: F) -> Result<User, AuthError>
    where
        F: Fn(&mut User) + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            let mut user = self.user_for_credentials(email).await?;
            change(&mut user);

            match self.users.update_user(&user).await {
                Ok(updated) => return Ok(updated),
                Err(RepositoryError::VersionMismatch { .. }) if attempt < UPDATE_ATTEMPTS => {
                    debug!(attempt, "concurrent update, retrying");
                    attempt += 1;
                }
                Err(RepositoryError::Conflict(_)) => {
                    info!("email already taken");
                    return Err(AuthError::UserExists);
                }
                Err(RepositoryError::NotFound) => return Err(AuthError::InvalidCredentials),
                Err(e) => {
                    error!(error = %e, "failed to update user");
                    return Err(e.into());
                }
            }
        }
    }

    async fn revoke_quietly(&self, token: &str) {
        let Some(token) = parse_presented(token) else {
            return;
        };
        if let Err(e) = self.tokens.delete_token(&token).await {
            warn!(error = %e, "failed to revoke previous token");
        }
    }
}

/// A token as presented by a caller; anything that could never have been
/// issued is treated as absent.
fn parse_presented(token: &str) -> Option<SessionToken> {
    if token.is_empty() {
        return None;
    }
    SessionToken::parse(token).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests;
