//! Sapphire social network API.
//!
//! Every request passes the fixed-window admission check in [`rate_limit`]
//! (when enabled) before reaching a handler. Listing endpoints page through
//! posts with the time-cursor scheme in [`pagination`].

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod pagination;
pub mod rate_limit;
pub mod service;
pub mod state;
pub mod store;
pub mod worker;

use handlers::*;
use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/health", get(health_handler))
        .route("/user", post(register_user_handler))
        .route("/user/{user_id}", get(get_user_handler))
        .route("/user/{user_id}/feed", get(user_feed_handler))
        .route("/user/{user_id}/follow/{target_id}", put(follow_user_handler))
        .route("/user/{user_id}/unfollow/{target_id}", put(unfollow_user_handler))
        .route("/user/by/{username}", get(get_user_by_username_handler))
        .route("/user/by/{username}/posts", get(user_posts_handler))
        .route("/verify-email/{token}", put(activate_user_handler))
        .route("/post", post(create_post_handler))
        .route(
            "/post/{post_id}",
            get(get_post_handler)
                .patch(update_post_handler)
                .delete(delete_post_handler),
        );

    let mut app = Router::new()
        .nest("/v1", v1)
        .route("/metrics", get(metrics_handler));

    if state.rate_limit_enabled {
        app = app.layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ));
    }

    app.layer(middleware::from_fn(metrics::track_requests))
        .with_state(state)
}
