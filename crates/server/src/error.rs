//! Unified error handling with Sentry integration.
//!
//! Every RPC handler returns `Result<T, AppError>`. Server-side failures are
//! captured to Sentry before responding; clients only ever see a stable
//! code and a generic message for them.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::AuthError;

/// Application-level error type for the RPC surface.
#[derive(Debug, Error)]
pub enum AppError {
    /// Credential service failure.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Request failed boundary validation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wire shape of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

impl AppError {
    /// HTTP status and stable code for this error.
    #[must_use]
    pub const fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidArgument(_) | Self::Auth(AuthError::InvalidCredentials) => {
                (StatusCode::BAD_REQUEST, "invalid_argument")
            }
            Self::Auth(AuthError::UserExists) => (StatusCode::CONFLICT, "already_exists"),
            Self::NotFound(_) | Self::Auth(AuthError::NotFound) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            Self::Internal(_)
            | Self::Auth(
                AuthError::TokenGenerationFailed
                | AuthError::Repository(_)
                | AuthError::Cache(_)
                | AuthError::PasswordHash,
            ) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidArgument(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::InvalidArgument(msg) => msg.clone(),
            Self::NotFound(_) | Self::Auth(AuthError::NotFound) => "User not found".to_string(),
            Self::Auth(AuthError::InvalidCredentials) => "Invalid credentials".to_string(),
            Self::Auth(AuthError::UserExists) => {
                "An account with this email already exists".to_string()
            }
            _ => "Internal server error".to_string(),
        };

        (
            status,
            Json(ErrorBody {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
