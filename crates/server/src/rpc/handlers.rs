//! RPC handlers.
//!
//! Each handler decodes a JSON body, validates its fields and calls the
//! credential service. Responses carrying a token also carry its lifetime
//! in whole seconds.

use std::time::Duration;

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use serde::{Deserialize, Serialize};

use authsvc_core::RememberMe;

use super::validate;
use crate::error::{AppError, Result};
use crate::services::{AuthError, IssuedToken};
use crate::state::AppState;

type Body<T> = std::result::Result<Json<T>, JsonRejection>;

// ============================================================================
// Wire types
// ============================================================================

/// Email and password login or registration.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub ip: String,
    /// `"on"` for a remembered session; anything else is short-lived.
    #[serde(default)]
    pub remember_me: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthRequest {
    pub email: String,
    #[serde(default)]
    pub ip: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeEmailRequest {
    pub email: String,
    pub new_email: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub email: String,
    #[serde(default)]
    pub remember_me: String,
}

/// A freshly issued session.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// Lifetime in seconds.
    pub token_ttl: u64,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token.into_inner(),
            token_ttl: issued.ttl.as_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifiedResponse {
    pub verified: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserEmailResponse {
    /// Empty when the token is not live.
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenTtlResponse {
    /// Remaining seconds, 0 when the token is not live.
    pub token_ttl: u64,
}

/// Body of calls that return nothing.
#[derive(Debug, Serialize, Deserialize)]
pub struct Empty {}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    body: Body<CredentialsRequest>,
) -> Result<Json<TokenResponse>> {
    let Json(req) = body?;
    let email = validate::email("email", &req.email)?;
    validate::password(&req.password)?;

    let issued = state
        .auth()
        .login(
            &email,
            &req.password,
            &req.ip,
            RememberMe::from_flag(&req.remember_me),
        )
        .await?;
    Ok(Json(issued.into()))
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    body: Body<CredentialsRequest>,
) -> Result<Json<TokenResponse>> {
    let Json(req) = body?;
    let email = validate::email("email", &req.email)?;
    validate::password(&req.password)?;

    let issued = state
        .auth()
        .register(
            &email,
            &req.password,
            &req.ip,
            RememberMe::from_flag(&req.remember_me),
        )
        .await?;
    Ok(Json(issued.into()))
}

/// POST /api/auth/oauth
pub async fn oauth(
    State(state): State<AppState>,
    body: Body<OAuthRequest>,
) -> Result<Json<TokenResponse>> {
    let Json(req) = body?;
    let email = validate::email("email", &req.email)?;

    let issued = state.auth().oauth(&email, &req.ip).await?;
    Ok(Json(issued.into()))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    body: Body<TokenRequest>,
) -> Result<Json<Empty>> {
    let Json(req) = body?;
    state.auth().logout(&req.token).await?;
    Ok(Json(Empty {}))
}

/// POST /api/auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    body: Body<ChangePasswordRequest>,
) -> Result<Json<TokenResponse>> {
    let Json(req) = body?;
    let email = validate::email("email", &req.email)?;
    validate::password(&req.password)?;

    let issued = state
        .auth()
        .change_password(&email, &req.password, &req.ip, &req.token)
        .await?;
    Ok(Json(issued.into()))
}

/// POST /api/auth/change-email
///
/// An unknown current email is reported as not found rather than as bad
/// credentials.
pub async fn change_email(
    State(state): State<AppState>,
    body: Body<ChangeEmailRequest>,
) -> Result<Json<TokenResponse>> {
    let Json(req) = body?;
    let email = validate::email("email", &req.email)?;
    let new_email = validate::email("new_email", &req.new_email)?;

    let issued = state
        .auth()
        .change_email(&email, &new_email, &req.token)
        .await
        .map_err(|e| match e {
            AuthError::InvalidCredentials => AppError::NotFound(email.to_string()),
            other => other.into(),
        })?;
    Ok(Json(issued.into()))
}

/// POST /api/auth/email-verify
pub async fn email_verify(
    State(state): State<AppState>,
    body: Body<EmailRequest>,
) -> Result<Json<Empty>> {
    let Json(req) = body?;
    let email = validate::email("email", &req.email)?;

    state.auth().email_verify(&email).await?;
    Ok(Json(Empty {}))
}

/// POST /api/auth/email-verified
pub async fn email_verified(
    State(state): State<AppState>,
    body: Body<EmailRequest>,
) -> Result<Json<VerifiedResponse>> {
    let Json(req) = body?;
    let email = validate::email("email", &req.email)?;

    let verified = state.auth().email_verified(&email).await?;
    Ok(Json(VerifiedResponse { verified }))
}

/// POST /api/auth/token
pub async fn create_token(
    State(state): State<AppState>,
    body: Body<CreateTokenRequest>,
) -> Result<Json<TokenResponse>> {
    let Json(req) = body?;
    let email = validate::email("email", &req.email)?;

    let issued = state
        .auth()
        .create_token(&email, RememberMe::from_flag(&req.remember_me))
        .await?;
    Ok(Json(issued.into()))
}

/// POST /api/auth/user-email
pub async fn user_email(
    State(state): State<AppState>,
    body: Body<TokenRequest>,
) -> Result<Json<UserEmailResponse>> {
    let Json(req) = body?;
    let email = state
        .auth()
        .get_user_email(&req.token)
        .await
        .map(authsvc_core::Email::into_inner)
        .unwrap_or_default();
    Ok(Json(UserEmailResponse { email }))
}

/// POST /api/auth/token-ttl
pub async fn token_ttl(
    State(state): State<AppState>,
    body: Body<TokenRequest>,
) -> Result<Json<TokenTtlResponse>> {
    let Json(req) = body?;
    let token_ttl = state
        .auth()
        .token_ttl(&req.token)
        .await
        .as_ref()
        .map_or(0, Duration::as_secs);
    Ok(Json(TokenTtlResponse { token_ttl }))
}
