//! Persistence seam.
//!
//! Handlers and services only see the [`UserStore`] and [`PostStore`]
//! traits. [`MemoryStore`] is the in-process implementation the server runs on.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{Post, PostId, PostWithAuthor, User, UserId};
use crate::pagination::{PageRequest, sort_newest_first};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("resource not found")]
    NotFound,
    #[error("resource already exists")]
    Conflict,
    #[error("store query timed out")]
    Timeout,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// Pending activation for a freshly registered user. Only the digest of the
/// token is stored.
#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates an inactive user together with its invitation.
    async fn create_and_invite(
        &self,
        user: NewUser,
        invitation: NewInvitation,
    ) -> Result<User, StoreError>;
    /// Activates the user owning an unexpired invitation and drops the invitation.
    async fn activate(&self, token_hash: &str, now: DateTime<Utc>) -> Result<User, StoreError>;
    /// Deletes inactive users whose invitation expired before `now`, along
    /// with their posts and follow edges. Returns the removed ids.
    async fn purge_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<UserId>, StoreError>;
    async fn get_by_id(&self, id: UserId) -> Result<User, StoreError>;
    async fn get_by_username(&self, username: &str) -> Result<User, StoreError>;
    async fn follow(&self, follower: UserId, followed: UserId) -> Result<(), StoreError>;
    async fn unfollow(&self, follower: UserId, followed: UserId) -> Result<(), StoreError>;
}

/// Post persistence. The two listing calls follow the cursor contract: at
/// most `page.fetch_size()` rows, all strictly older than the cursor, newest
/// first with ties broken by descending id.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, post: NewPost) -> Result<Post, StoreError>;
    async fn get(&self, id: PostId) -> Result<PostWithAuthor, StoreError>;
    async fn update(&self, id: PostId, patch: PostPatch) -> Result<Post, StoreError>;
    async fn delete(&self, id: PostId) -> Result<(), StoreError>;
    /// Posts by `user_id` and by everyone they follow.
    async fn feed(
        &self,
        user_id: UserId,
        page: &PageRequest,
    ) -> Result<Vec<PostWithAuthor>, StoreError>;
    async fn by_author(
        &self,
        user_id: UserId,
        page: &PageRequest,
    ) -> Result<Vec<PostWithAuthor>, StoreError>;
}

struct Invitation {
    user_id: UserId,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    usernames: HashMap<String, UserId>,
    // keyed by token digest
    invitations: HashMap<String, Invitation>,
    posts: BTreeMap<PostId, Post>,
    // (follower, followed)
    follows: HashSet<(UserId, UserId)>,
    last_user_id: UserId,
    last_post_id: PostId,
    last_post_at: Option<DateTime<Utc>>,
}

impl Tables {
    fn page_where(
        &self,
        page: &PageRequest,
        mut include: impl FnMut(&Post) -> bool,
    ) -> Result<Vec<PostWithAuthor>, StoreError> {
        let mut rows = self
            .posts
            .values()
            .filter(|post| page.admits(post.created_at) && include(post))
            .map(|post| {
                let author = self.users.get(&post.user_id).ok_or(StoreError::NotFound)?;
                Ok(PostWithAuthor {
                    post: post.clone(),
                    author: author.clone(),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        sort_newest_first(&mut rows);
        rows.truncate(page.fetch_size());
        Ok(rows)
    }

    // Post timestamps are unique and strictly increasing so a timestamp cursor
    // never splits a group of equal rows.
    fn next_post_time(&mut self, requested: DateTime<Utc>) -> DateTime<Utc> {
        let created_at = match self.last_post_at {
            Some(last) if requested <= last => last + TimeDelta::nanoseconds(1),
            _ => requested,
        };
        self.last_post_at = Some(created_at);
        created_at
    }

    fn remove_user(&mut self, id: UserId) {
        if let Some(user) = self.users.remove(&id) {
            self.usernames.remove(&user.username);
        }
        self.invitations.retain(|_, inv| inv.user_id != id);
        self.follows
            .retain(|&(follower, followed)| follower != id && followed != id);
        self.posts.retain(|_, post| post.user_id != id);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a post with a requested creation time. Used for seeding.
    ///
    /// A time at or before the newest stored post is moved one nanosecond
    /// past it, so the returned post may carry a later `created_at`.
    pub async fn create_post_at(
        &self,
        post: NewPost,
        created_at: DateTime<Utc>,
    ) -> Result<Post, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&post.user_id) {
            return Err(StoreError::NotFound);
        }
        let created_at = tables.next_post_time(created_at);
        tables.last_post_id += 1;
        let post = Post {
            id: tables.last_post_id,
            user_id: post.user_id,
            title: post.title,
            content: post.content,
            tags: post.tags,
            created_at,
            updated_at: created_at,
        };
        tables.posts.insert(post.id, post.clone());
        Ok(post)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_and_invite(
        &self,
        user: NewUser,
        invitation: NewInvitation,
    ) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.usernames.contains_key(&user.username)
            || tables.invitations.contains_key(&invitation.token_hash)
        {
            return Err(StoreError::Conflict);
        }
        tables.last_user_id += 1;
        let user = User {
            id: tables.last_user_id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_active: false,
            created_at: Utc::now(),
        };
        tables.usernames.insert(user.username.clone(), user.id);
        tables.users.insert(user.id, user.clone());
        tables.invitations.insert(
            invitation.token_hash,
            Invitation {
                user_id: user.id,
                expires_at: invitation.expires_at,
            },
        );
        Ok(user)
    }

    async fn activate(&self, token_hash: &str, now: DateTime<Utc>) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        let user_id = match tables.invitations.get(token_hash) {
            Some(inv) if inv.expires_at > now => inv.user_id,
            _ => return Err(StoreError::NotFound),
        };
        let user = tables.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.is_active = true;
        let user = user.clone();
        tables.invitations.retain(|_, inv| inv.user_id != user_id);
        Ok(user)
    }

    async fn purge_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<UserId>, StoreError> {
        let mut tables = self.tables.write().await;
        let mut expired: Vec<UserId> = tables
            .invitations
            .values()
            .filter(|inv| inv.expires_at < now)
            .map(|inv| inv.user_id)
            .filter(|id| tables.users.get(id).is_some_and(|u| !u.is_active))
            .collect();
        expired.sort_unstable();
        expired.dedup();
        for &id in &expired {
            tables.remove_user(id);
        }
        Ok(expired)
    }

    async fn get_by_id(&self, id: UserId) -> Result<User, StoreError> {
        let tables = self.tables.read().await;
        tables.users.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_by_username(&self, username: &str) -> Result<User, StoreError> {
        let tables = self.tables.read().await;
        tables
            .usernames
            .get(username)
            .and_then(|id| tables.users.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn follow(&self, follower: UserId, followed: UserId) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&follower) || !tables.users.contains_key(&followed) {
            return Err(StoreError::NotFound);
        }
        if !tables.follows.insert((follower, followed)) {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    async fn unfollow(&self, follower: UserId, followed: UserId) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.follows.remove(&(follower, followed)) {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create(&self, post: NewPost) -> Result<Post, StoreError> {
        self.create_post_at(post, Utc::now()).await
    }

    async fn get(&self, id: PostId) -> Result<PostWithAuthor, StoreError> {
        let tables = self.tables.read().await;
        let post = tables.posts.get(&id).ok_or(StoreError::NotFound)?;
        let author = tables.users.get(&post.user_id).ok_or(StoreError::NotFound)?;
        Ok(PostWithAuthor {
            post: post.clone(),
            author: author.clone(),
        })
    }

    async fn update(&self, id: PostId, patch: PostPatch) -> Result<Post, StoreError> {
        let mut tables = self.tables.write().await;
        let post = tables.posts.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(title) = patch.title {
            post.title = title;
        }
        if let Some(content) = patch.content {
            post.content = content;
        }
        post.updated_at = Utc::now();
        Ok(post.clone())
    }

    async fn delete(&self, id: PostId) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .posts
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn feed(
        &self,
        user_id: UserId,
        page: &PageRequest,
    ) -> Result<Vec<PostWithAuthor>, StoreError> {
        let tables = self.tables.read().await;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        tables.page_where(page, |post| {
            post.user_id == user_id || tables.follows.contains(&(user_id, post.user_id))
        })
    }

    async fn by_author(
        &self,
        user_id: UserId,
        page: &PageRequest,
    ) -> Result<Vec<PostWithAuthor>, StoreError> {
        let tables = self.tables.read().await;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        tables.page_where(page, |post| post.user_id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::PageBounds;
    use chrono::{Duration, TimeZone};

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            first_name: name.to_string(),
            last_name: String::new(),
        }
    }

    fn invitation(token: &str, expires_at: DateTime<Utc>) -> NewInvitation {
        NewInvitation {
            token_hash: token.to_string(),
            expires_at,
        }
    }

    async fn add_user(store: &MemoryStore, name: &str) -> Result<User, StoreError> {
        let expires_at = Utc::now() + Duration::days(7);
        store
            .create_and_invite(new_user(name), invitation(&format!("token-{name}"), expires_at))
            .await
    }

    fn new_post(user_id: UserId, title: &str) -> NewPost {
        NewPost {
            user_id,
            title: title.to_string(),
            content: "content".to_string(),
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = MemoryStore::new();
        add_user(&store, "ayaka").await.unwrap();
        let err = store
            .create_and_invite(new_user("ayaka"), invitation("other", Utc::now()))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict);
    }

    #[tokio::test]
    async fn follow_rules() {
        let store = MemoryStore::new();
        let a = add_user(&store, "a").await.unwrap();
        let b = add_user(&store, "b").await.unwrap();

        store.follow(a.id, b.id).await.unwrap();
        assert_eq!(store.follow(a.id, b.id).await, Err(StoreError::Conflict));
        assert_eq!(store.follow(a.id, 999).await, Err(StoreError::NotFound));

        store.unfollow(a.id, b.id).await.unwrap();
        assert_eq!(store.unfollow(a.id, b.id).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn feed_contains_own_and_followed_posts_only() {
        let store = MemoryStore::new();
        let a = add_user(&store, "a").await.unwrap();
        let b = add_user(&store, "b").await.unwrap();
        let c = add_user(&store, "c").await.unwrap();
        store.follow(a.id, b.id).await.unwrap();

        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store.create_post_at(new_post(a.id, "mine"), base).await.unwrap();
        store
            .create_post_at(new_post(b.id, "followed"), base + Duration::seconds(1))
            .await
            .unwrap();
        store
            .create_post_at(new_post(c.id, "stranger"), base + Duration::seconds(2))
            .await
            .unwrap();

        let page = PageRequest::first(PageBounds::FEED);
        let rows = store.feed(a.id, &page).await.unwrap();
        let titles: Vec<&str> = rows.iter().map(|r| r.post.title.as_str()).collect();
        assert_eq!(titles, vec!["followed", "mine"]);
        assert_eq!(rows[0].author.username, "b");
    }

    #[tokio::test]
    async fn listing_fetches_one_extra_row() {
        let store = MemoryStore::new();
        let a = add_user(&store, "a").await.unwrap();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for n in 0..8 {
            store
                .create_post_at(new_post(a.id, &format!("p{n}")), base + Duration::seconds(n))
                .await
                .unwrap();
        }

        let page = PageRequest {
            limit: 3,
            cursor: Some(base + Duration::seconds(6)),
        };
        let rows = store.by_author(a.id, &page).await.unwrap();
        let titles: Vec<&str> = rows.iter().map(|r| r.post.title.as_str()).collect();
        assert_eq!(titles, vec!["p5", "p4", "p3", "p2"]);
    }

    #[tokio::test]
    async fn update_and_delete_missing_post() {
        let store = MemoryStore::new();
        assert_eq!(
            store.update(42, PostPatch::default()).await,
            Err(StoreError::NotFound)
        );
        assert_eq!(store.delete(42).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn equal_timestamps_are_spread_apart() {
        let store = MemoryStore::new();
        let a = add_user(&store, "a").await.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut stamps = Vec::new();
        for n in 0..4 {
            let post = store.create_post_at(new_post(a.id, &format!("p{n}")), at).await.unwrap();
            stamps.push(post.created_at);
        }
        assert_eq!(stamps[0], at);
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));

        // an older requested time still lands after the newest post
        let late = store
            .create_post_at(new_post(a.id, "late"), at - Duration::hours(1))
            .await
            .unwrap();
        assert!(late.created_at > stamps[3]);
    }

    #[tokio::test]
    async fn activation_consumes_the_invitation() {
        let store = MemoryStore::new();
        let user = add_user(&store, "kazuha").await.unwrap();
        assert!(!user.is_active);

        let now = Utc::now();
        let active = store.activate("token-kazuha", now).await.unwrap();
        assert_eq!(active.id, user.id);
        assert!(active.is_active);
        assert!(store.get_by_id(user.id).await.unwrap().is_active);

        assert_eq!(
            store.activate("token-kazuha", now).await,
            Err(StoreError::NotFound)
        );
        assert_eq!(store.activate("unknown", now).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn expired_invitation_cannot_activate() {
        let store = MemoryStore::new();
        let expires_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store
            .create_and_invite(new_user("late"), invitation("tok", expires_at))
            .await
            .unwrap();
        assert_eq!(
            store.activate("tok", expires_at).await,
            Err(StoreError::NotFound)
        );
        assert!(store.activate("tok", expires_at - Duration::seconds(1)).await.is_ok());
    }

    #[tokio::test]
    async fn purge_removes_only_expired_pending_users() {
        let store = MemoryStore::new();
        let deadline = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stale = store
            .create_and_invite(new_user("stale"), invitation("t1", deadline))
            .await
            .unwrap();
        let activated = store
            .create_and_invite(new_user("activated"), invitation("t2", deadline))
            .await
            .unwrap();
        let fresh = store
            .create_and_invite(new_user("fresh"), invitation("t3", deadline + Duration::days(7)))
            .await
            .unwrap();
        store.activate("t2", deadline - Duration::minutes(1)).await.unwrap();
        store.follow(stale.id, activated.id).await.unwrap();
        store.create_post_at(new_post(stale.id, "gone"), deadline).await.unwrap();

        let purged = store
            .purge_expired_pending(deadline + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, vec![stale.id]);

        assert_eq!(store.get_by_id(stale.id).await, Err(StoreError::NotFound));
        assert_eq!(store.get_by_username("stale").await, Err(StoreError::NotFound));
        assert!(store.get_by_id(activated.id).await.is_ok());
        assert!(store.get_by_id(fresh.id).await.is_ok());
        let page = PageRequest::first(PageBounds::FEED);
        assert!(store.feed(activated.id, &page).await.unwrap().is_empty());

        // the username can be registered again
        assert!(add_user(&store, "stale").await.is_ok());
    }
}
