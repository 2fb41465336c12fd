use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{ChangePasswordRequest, ProfileRequest, RegisterRequest},
        error::AuthError,
        password::CredentialHasher,
        repo::UserDirectory,
        repo_types::{NewUser, ProfileUpdate},
        reset_code,
    },
    notify::{NotificationSink, ResetNotification},
};

pub const MIN_PASSWORD_LEN: usize = 6;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    // Verified against when the username is unknown, so both rejection paths
    // cost one hash verification.
    static ref DUMMY_HASH: Option<String> = CredentialHasher::new()
        .hash("keyward-dummy-password")
        .ok();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_password(password: &str, confirm: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::validation(
            "password is required and should be at least six characters",
        ));
    }
    if password != confirm {
        return Err(AuthError::validation("passwords do not match"));
    }
    Ok(())
}

fn validate_profile(name: &str, email: &str, username: &str) -> Result<(), AuthError> {
    if name.is_empty() {
        return Err(AuthError::validation("name field is empty"));
    }
    if email.is_empty() {
        return Err(AuthError::validation("email is required"));
    }
    if !is_valid_email(email) {
        return Err(AuthError::validation("invalid email"));
    }
    if username.is_empty() {
        return Err(AuthError::validation("username is required"));
    }
    Ok(())
}

/// Validate a registration and persist the user. Returns the new user id.
pub async fn register(dir: &dyn UserDirectory, req: &RegisterRequest) -> Result<Uuid, AuthError> {
    let name = req.name.trim();
    let email = normalize_email(&req.email);
    let username = req.username.trim();

    validate_profile(name, &email, username)?;
    validate_password(&req.password, &req.password_confirm)?;

    let id = dir
        .insert_user(NewUser {
            name,
            email: &email,
            username,
            password: &req.password,
        })
        .await
        .map_err(|e| {
            warn!(error = %e, %email, "register failed");
            e
        })?;
    info!(user_id = %id, %email, "user registered");
    Ok(id)
}

/// Approve or reject a sign-in. Unknown usernames and wrong passwords are
/// both reported as `InvalidCredentials`.
pub async fn authenticate(
    dir: &dyn UserDirectory,
    hasher: &CredentialHasher,
    username: &str,
    password: &str,
) -> Result<(Uuid, String), AuthError> {
    let (id, hash) = match dir.credentials_by_username(username.trim()).await {
        Ok(row) => row,
        Err(AuthError::NotFound) => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = hasher.verify(password, dummy);
            }
            warn!("signin unknown username");
            return Err(AuthError::InvalidCredentials);
        }
        Err(e) => return Err(e),
    };

    if !hasher.verify(password, &hash)? {
        warn!(user_id = %id, "signin invalid password");
        return Err(AuthError::InvalidCredentials);
    }
    Ok((id, hash))
}

/// First phase of a reset: store a fresh code and hand it to the sink.
/// A failed delivery leaves the stored code in place.
pub async fn initiate_reset(
    dir: &dyn UserDirectory,
    sink: &dyn NotificationSink,
    source: &str,
    email: &str,
) -> Result<Uuid, AuthError> {
    let email = normalize_email(email);
    let user = dir.user_by_email(&email).await?;
    let code = reset_code::generate()?;
    dir.set_reset_code(user.id, &code).await?;

    let notification = ResetNotification {
        source: source.to_string(),
        destination: user.email.clone(),
        password_reset_code: code,
    };
    sink.send_reset_code(&notification).await.map_err(|e| {
        error!(error = %e, user_id = %user.id, "reset notification failed");
        AuthError::Notification(e.to_string())
    })?;
    info!(user_id = %user.id, "password reset initiated");
    Ok(user.id)
}

/// Second phase of a reset: check the code, store the new hash and consume
/// the code. Returns the user id.
pub async fn complete_reset(
    dir: &dyn UserDirectory,
    hasher: &CredentialHasher,
    email: &str,
    code: &str,
    new_password: &str,
) -> Result<Uuid, AuthError> {
    let email = normalize_email(email);
    let user = dir.user_by_email(&email).await?;

    if code.is_empty() || user.password_reset_code.as_deref() != Some(code) {
        warn!(user_id = %user.id, "invalid reset password code");
        return Err(AuthError::InvalidResetCode);
    }
    validate_password(new_password, new_password)?;

    let hash = hasher.hash(new_password)?;
    match dir.update_password(&email, &hash, code).await {
        Ok(()) => {}
        // consumed by a concurrent request between lookup and update
        Err(AuthError::NotFound) => return Err(AuthError::InvalidResetCode),
        Err(e) => return Err(e),
    }
    info!(user_id = %user.id, "password reset completed");
    Ok(user.id)
}

pub async fn change_password(
    dir: &dyn UserDirectory,
    user_id: Uuid,
    req: &ChangePasswordRequest,
) -> Result<(), AuthError> {
    validate_password(&req.password, &req.password_confirm)?;
    dir.change_password(user_id, &req.password).await?;
    info!(%user_id, "password changed");
    Ok(())
}

pub async fn update_profile(
    dir: &dyn UserDirectory,
    user_id: Uuid,
    req: &ProfileRequest,
) -> Result<(), AuthError> {
    let profile = ProfileUpdate {
        name: req.name.trim().to_string(),
        email: normalize_email(&req.email),
        username: req.username.trim().to_string(),
    };
    validate_profile(&profile.name, &profile.email, &profile.username)?;
    dir.update_profile(user_id, &profile).await?;
    info!(%user_id, "profile updated");
    Ok(())
}
