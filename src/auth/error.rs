use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors surfaced by the credential core and mapped onto HTTP responses.
///
/// Variants carrying internal detail (`Storage`, `Notification`) keep it for
/// server-side logs only; clients always receive a fixed message.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid reset password code")]
    InvalidResetCode,

    #[error("no matching user")]
    NotFound,

    #[error("email or username already taken")]
    DuplicateKey,

    #[error("missing or invalid token")]
    Unauthorized,

    #[error("storage deadline exceeded")]
    Timeout,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("password hashing failed")]
    Hashing,

    #[error("stored password hash is malformed")]
    MalformedHash,

    #[error("token signing failed")]
    Signing,

    #[error("reset code generation failed")]
    Generation,

    #[error("notification delivery failed: {0}")]
    Notification(String),
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::DuplicateKey => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::InvalidResetCode | AuthError::NotFound => {
                StatusCode::FORBIDDEN
            }
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Timeout
            | AuthError::Storage(_)
            | AuthError::Hashing
            | AuthError::Signing => StatusCode::BAD_REQUEST,
            AuthError::MalformedHash | AuthError::Generation => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Notification(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn client_message(&self) -> String {
        match self {
            AuthError::Validation(msg) => msg.clone(),
            AuthError::InvalidCredentials => "unauthorized, check your login details".into(),
            AuthError::InvalidResetCode => "invalid reset password code".into(),
            AuthError::NotFound => "no user with this email".into(),
            AuthError::DuplicateKey => "email or username already taken".into(),
            AuthError::Unauthorized => "invalid or expired token".into(),
            AuthError::Timeout | AuthError::Storage(_) => "error processing request".into(),
            AuthError::Hashing | AuthError::MalformedHash => "error processing password".into(),
            AuthError::Signing => "error signing in".into(),
            AuthError::Generation => "error generating password reset code".into(),
            AuthError::Notification(_) => "error sending password reset email".into(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "message": self.client_message() }))).into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AuthError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => AuthError::DuplicateKey,
            other => {
                tracing::error!(error = %other, "database error");
                AuthError::Storage(other.to_string())
            }
        }
    }
}
