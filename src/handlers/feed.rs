use axum::{
    Json,
    extract::{Path, Query, State, rejection::PathRejection},
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{FeedResponse, PageParams, PostResponse, UserId, UserPostsResponse, UserResponse};
use crate::state::AppState;

// Posts from the user and everyone they follow, newest first
pub async fn user_feed_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<UserId>, PathRejection>,
    Query(params): Query<PageParams>,
) -> Result<Json<FeedResponse>, ApiError> {
    let Path(user_id) = path?;
    let page = state
        .service
        .feed(user_id, params.limit.as_deref(), params.cursor.as_deref())
        .await?;

    Ok(Json(FeedResponse {
        posts: page.items.iter().map(PostResponse::from).collect(),
        next_cursor: page.next_cursor,
    }))
}

// Profile listing for a single author
pub async fn user_posts_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<UserPostsResponse>, ApiError> {
    let (user, page) = state
        .service
        .user_posts(&username, params.limit.as_deref(), params.cursor.as_deref())
        .await?;

    Ok(Json(UserPostsResponse {
        user: UserResponse::from(&user),
        posts: page.items.iter().map(PostResponse::from).collect(),
        next_cursor: page.next_cursor,
    }))
}
