mod feed;
mod health;
mod metrics;
mod post;
mod user;

pub use feed::{user_feed_handler, user_posts_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use post::{create_post_handler, delete_post_handler, get_post_handler, update_post_handler};
pub use user::{
    activate_user_handler, follow_user_handler, get_user_by_username_handler, get_user_handler, register_user_handler,
    unfollow_user_handler,
};
