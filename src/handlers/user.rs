use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{RegisterUserPayload, RegistrationResponse, UserId, UserResponse};
use crate::state::AppState;

// Creates a pending account; the activation token comes back in the body
pub async fn register_user_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterUserPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<RegistrationResponse>), ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let registration = state.service.register_user(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            user: UserResponse::from(&registration.user),
            token: registration.token,
            expires_at: registration.expires_at,
        }),
    ))
}

pub async fn activate_user_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.activate(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<UserId>, PathRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Path(user_id) = path?;
    if user_id < 1 {
        return Err(ApiError::BadRequest("user id must be positive".to_string()));
    }
    let user = state.service.user(user_id).await?;
    Ok(Json(UserResponse::from(&user)))
}

pub async fn get_user_by_username_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.service.user_by_username(&username).await?;
    Ok(Json(UserResponse::from(&user)))
}

pub async fn follow_user_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(UserId, UserId)>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path((user_id, target_id)) = path?;
    state.service.follow(user_id, target_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unfollow_user_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(UserId, UserId)>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path((user_id, target_id)) = path?;
    state.service.unfollow(user_id, target_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
