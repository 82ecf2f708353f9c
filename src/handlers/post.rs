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
use crate::models::{CreatePostPayload, PostId, PostResponse, UpdatePostPayload};
use crate::state::AppState;

pub async fn create_post_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreatePostPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let post = state.service.create_post(payload).await?;
    Ok((StatusCode::CREATED, Json(PostResponse::from(&post))))
}

pub async fn get_post_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<PostId>, PathRejection>,
) -> Result<Json<PostResponse>, ApiError> {
    let Path(post_id) = path?;
    let row = state.service.post(post_id).await?;
    Ok(Json(PostResponse::from(&row)))
}

pub async fn update_post_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<PostId>, PathRejection>,
    payload: Result<Json<UpdatePostPayload>, JsonRejection>,
) -> Result<Json<PostResponse>, ApiError> {
    let Path(post_id) = path?;
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let post = state.service.update_post(post_id, payload).await?;
    Ok(Json(PostResponse::from(&post)))
}

pub async fn delete_post_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<PostId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(post_id) = path?;
    state.service.delete_post(post_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
