//! Service layer between handlers and the stores.
//!
//! Every store call runs under a query timeout. Listing calls validate the
//! raw page parameters before anything reaches a store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::cache::UserCache;
use crate::metrics::{CACHE_HITS, CACHE_MISSES, CACHE_SIZE};
use crate::models::{
    CreatePostPayload, Post, PostId, PostWithAuthor, RegisterUserPayload, UpdatePostPayload, User,
    UserId,
};
use crate::pagination::{Page, PageBounds, PageRequest, PaginationError};
use crate::store::{NewInvitation, NewPost, NewUser, PostPatch, PostStore, StoreError, UserStore};

pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const INVITATION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// A new pending account and the plain token that activates it.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct Service {
    users: Arc<dyn UserStore>,
    posts: Arc<dyn PostStore>,
    cache: Option<Arc<UserCache>>,
    query_timeout: Duration,
    invitation_ttl: Duration,
}

// Only the digest of an invitation token is persisted
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Service {
    pub fn new(
        users: Arc<dyn UserStore>,
        posts: Arc<dyn PostStore>,
        cache: Option<Arc<UserCache>>,
    ) -> Self {
        Self {
            users,
            posts,
            cache,
            query_timeout: QUERY_TIMEOUT,
            invitation_ttl: INVITATION_TTL,
        }
    }

    pub fn with_invitation_ttl(mut self, invitation_ttl: Duration) -> Self {
        self.invitation_ttl = invitation_ttl;
        self
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    async fn query<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    /// Creates an inactive account plus an invitation that expires after the
    /// configured TTL.
    pub async fn register_user(
        &self,
        payload: RegisterUserPayload,
    ) -> Result<Registration, ServiceError> {
        payload.validate().map_err(ServiceError::InvalidPayload)?;

        let token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = TimeDelta::from_std(self.invitation_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let user = self
            .query(self.users.create_and_invite(
                NewUser {
                    username: payload.username,
                    first_name: payload.first_name,
                    last_name: payload.last_name,
                },
                NewInvitation {
                    token_hash: hash_token(&token),
                    expires_at,
                },
            ))
            .await?;
        tracing::info!(user_id = user.id, username = %user.username, %expires_at, "user registered");
        Ok(Registration {
            user,
            token,
            expires_at,
        })
    }

    pub async fn activate(&self, token: &str) -> Result<User, ServiceError> {
        if token.is_empty() {
            return Err(ServiceError::InvalidPayload("token must not be empty".to_string()));
        }
        let user = self
            .query(self.users.activate(&hash_token(token), Utc::now()))
            .await?;
        if let Some(cache) = &self.cache {
            cache.insert(user.clone());
        }
        tracing::info!(user_id = user.id, "user activated");
        Ok(user)
    }

    /// Removes accounts that were never activated before their invitation
    /// expired. Returns how many were removed.
    pub async fn purge_unconfirmed(&self) -> Result<usize, ServiceError> {
        let purged = self
            .query(self.users.purge_expired_pending(Utc::now()))
            .await?;
        if let Some(cache) = &self.cache {
            for &id in &purged {
                cache.remove(id);
            }
        }
        if !purged.is_empty() {
            tracing::info!(count = purged.len(), "purged unconfirmed users");
        }
        Ok(purged.len())
    }

    /// User lookup through the side-cache when it is enabled.
    pub async fn user(&self, id: UserId) -> Result<User, ServiceError> {
        let Some(cache) = &self.cache else {
            return Ok(self.query(self.users.get_by_id(id)).await?);
        };

        if let Some(user) = cache.get(id) {
            CACHE_HITS.inc();
            tracing::debug!(user_id = id, "user cache hit");
            return Ok(user);
        }

        CACHE_MISSES.inc();
        tracing::debug!(user_id = id, "user cache miss, fetching from store");
        let user = self.query(self.users.get_by_id(id)).await?;
        cache.insert(user.clone());
        CACHE_SIZE.set(cache.len() as f64);
        Ok(user)
    }

    pub async fn user_by_username(&self, username: &str) -> Result<User, ServiceError> {
        Ok(self.query(self.users.get_by_username(username)).await?)
    }

    pub async fn follow(&self, follower: UserId, followed: UserId) -> Result<(), ServiceError> {
        if follower == followed {
            return Err(ServiceError::InvalidPayload(
                "users cannot follow themselves".to_string(),
            ));
        }
        self.query(self.users.follow(follower, followed)).await?;
        tracing::info!(follower, followed, "user followed");
        Ok(())
    }

    pub async fn unfollow(&self, follower: UserId, followed: UserId) -> Result<(), ServiceError> {
        self.query(self.users.unfollow(follower, followed)).await?;
        tracing::info!(follower, followed, "user unfollowed");
        Ok(())
    }

    pub async fn create_post(&self, payload: CreatePostPayload) -> Result<Post, ServiceError> {
        payload.validate().map_err(ServiceError::InvalidPayload)?;
        let post = self
            .query(self.posts.create(NewPost {
                user_id: payload.user_id,
                title: payload.title,
                content: payload.content,
                tags: payload.tags,
            }))
            .await?;
        tracing::info!(post_id = post.id, user_id = post.user_id, "post created");
        Ok(post)
    }

    pub async fn post(&self, id: PostId) -> Result<PostWithAuthor, ServiceError> {
        Ok(self.query(self.posts.get(id)).await?)
    }

    pub async fn update_post(
        &self,
        id: PostId,
        payload: UpdatePostPayload,
    ) -> Result<Post, ServiceError> {
        payload.validate().map_err(ServiceError::InvalidPayload)?;
        let patch = PostPatch {
            title: payload.title,
            content: payload.content,
        };
        Ok(self.query(self.posts.update(id, patch)).await?)
    }

    pub async fn delete_post(&self, id: PostId) -> Result<(), ServiceError> {
        self.query(self.posts.delete(id)).await?;
        tracing::info!(post_id = id, "post deleted");
        Ok(())
    }

    pub async fn feed(
        &self,
        user_id: UserId,
        limit: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<Page<PostWithAuthor>, ServiceError> {
        let request = PageRequest::parse(limit, cursor, PageBounds::FEED)?;
        let rows = self.query(self.posts.feed(user_id, &request)).await?;
        Ok(Page::from_overfetch(rows, &request))
    }

    /// Profile listing: the author plus one page of their posts.
    pub async fn user_posts(
        &self,
        username: &str,
        limit: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<(User, Page<PostWithAuthor>), ServiceError> {
        let request = PageRequest::parse(limit, cursor, PageBounds::PROFILE)?;
        let user = self.query(self.users.get_by_username(username)).await?;
        let rows = self.query(self.posts.by_author(user.id, &request)).await?;
        Ok((user, Page::from_overfetch(rows, &request)))
    }
}
