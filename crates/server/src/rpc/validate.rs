//! Boundary validation of request fields.

use std::sync::LazyLock;

use regex::Regex;

use authsvc_core::Email;

use crate::error::AppError;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,8}$").expect("Invalid regex")
});

// ASCII digits only; `\d` would also admit other Unicode digits.
static PASSWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9@$!%*?&]{8,}$").expect("Invalid regex"));

/// Validate and parse an email field.
///
/// # Errors
///
/// Returns `AppError::InvalidArgument` naming `field`.
pub fn email(field: &str, value: &str) -> Result<Email, AppError> {
    if !EMAIL_RE.is_match(value) {
        return Err(AppError::InvalidArgument(format!("{field} is not a valid email")));
    }
    Email::parse(value).map_err(|e| AppError::InvalidArgument(format!("{field}: {e}")))
}

/// Validate a password field.
///
/// # Errors
///
/// Returns `AppError::InvalidArgument` if the password is shorter than 8
/// characters or uses characters outside letters, digits and `@$!%*?&`.
pub fn password(value: &str) -> Result<(), AppError> {
    if PASSWORD_RE.is_match(value) {
        Ok(())
    } else {
        Err(AppError::InvalidArgument(
            "password must be at least 8 characters of letters, digits or @$!%*?&".to_string(),
        ))
    }
}
