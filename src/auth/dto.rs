use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;

// Password-bearing requests deliberately do not derive Debug.

/// Request body for user registration. Missing fields deserialize as empty
/// strings and are rejected by validation.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub password_confirm: String,
}

/// Request body for sign-in.
#[derive(Deserialize)]
pub struct SigninRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub new_password: String,
    pub reset_code: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub name: String,
    pub email: String,
    pub username: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub password: String,
    pub password_confirm: String,
}

/// Generic acknowledgement carrying the affected user.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAck {
    pub ok: bool,
    pub message: String,
    pub user_id: Uuid,
}

impl UserAck {
    pub fn new(message: &str, user_id: Uuid) -> Self {
        Self {
            ok: true,
            message: message.to_string(),
            user_id,
        }
    }
}

/// Acknowledgement for the public echo route; the id is taken from the path.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAck {
    pub ok: bool,
    pub message: String,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub environment: String,
    pub version: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            username: u.username,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}
