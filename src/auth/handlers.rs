use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            Ack, ChangePasswordRequest, ForgotPasswordRequest, OpenAck, ProfileRequest,
            PublicUser, RegisterRequest, ResetPasswordRequest, SigninRequest, TokenResponse,
            UserAck,
        },
        error::AuthError,
        extractors::AuthUser,
        services,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/signin", post(signin))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/open-route/:id", get(open_route))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/secure", get(secure))
        .route("/me", get(get_me).put(update_me).delete(delete_me))
        .route("/me/password", put(change_password))
        .route("/users", get(list_users))
}

/// Unwrap a JSON body, turning any decode failure into a 400.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload.map(|Json(v)| v).map_err(|e| {
        warn!(error = %e, "malformed request body");
        AuthError::validation("malformed request body")
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserAck>), AuthError> {
    let payload = body(payload)?;
    let user_id = services::register(state.directory.as_ref(), &payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserAck::new("New user signed up", user_id)),
    ))
}

#[instrument(skip(state, payload))]
pub async fn signin(
    State(state): State<AppState>,
    payload: Result<Json<SigninRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AuthError> {
    let payload = body(payload)?;
    let (user_id, _) = services::authenticate(
        state.directory.as_ref(),
        &state.hasher,
        &payload.username,
        &payload.password,
    )
    .await?;
    let token = state.tokens.issue(user_id)?;
    info!(%user_id, "user signed in");
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<Ack>, AuthError> {
    let payload = body(payload)?;
    services::initiate_reset(
        state.directory.as_ref(),
        state.notifier.as_ref(),
        &state.config.notify.source,
        &payload.email,
    )
    .await?;
    Ok(Json(Ack {
        ok: true,
        message: "email sent".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<UserAck>, AuthError> {
    let payload = body(payload)?;
    let user_id = services::complete_reset(
        state.directory.as_ref(),
        &state.hasher,
        &payload.email,
        &payload.reset_code,
        &payload.new_password,
    )
    .await?;
    Ok(Json(UserAck::new("Password successfully updated", user_id)))
}

#[instrument(skip_all)]
pub async fn open_route(id: Result<Path<i64>, PathRejection>) -> Result<Json<OpenAck>, AuthError> {
    let Path(id) = id.map_err(|e| {
        warn!(error = %e, "invalid id in path");
        AuthError::validation("invalid id")
    })?;
    info!(id, "open route");
    Ok(Json(OpenAck {
        ok: true,
        message: "Open route, Anyone can see!!".into(),
        user_id: id,
    }))
}

#[instrument(skip_all)]
pub async fn secure(AuthUser(user_id): AuthUser) -> Json<UserAck> {
    Json(UserAck::new(
        "You are logged in and can access the secure route",
        user_id,
    ))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state.directory.user_by_id(user_id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<ProfileRequest>, JsonRejection>,
) -> Result<Json<PublicUser>, AuthError> {
    let payload = body(payload)?;
    services::update_profile(state.directory.as_ref(), user_id, &payload).await?;
    let user = state.directory.user_by_id(user_id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<UserAck>, AuthError> {
    let payload = body(payload)?;
    services::change_password(state.directory.as_ref(), user_id, &payload).await?;
    Ok(Json(UserAck::new("Password successfully updated", user_id)))
}

#[instrument(skip(state))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserAck>, AuthError> {
    state.directory.soft_delete(user_id).await?;
    info!(%user_id, "user deleted");
    Ok(Json(UserAck::new("User deleted", user_id)))
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Result<Json<Vec<PublicUser>>, AuthError> {
    let users = state.directory.list_users().await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_serializes_camel_case() {
        let id = uuid::Uuid::new_v4();
        let json = serde_json::to_value(UserAck::new("ok", id)).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["userId"], id.to_string());
    }
}
