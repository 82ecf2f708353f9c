use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::{User, UserId};

// Cache entry with timestamp
#[derive(Clone)]
pub struct CacheEntry {
    pub user: User,
    pub created_at: Instant,
}

// Side-cache for user lookups, read-through from the store
pub struct UserCache {
    entries: DashMap<UserId, CacheEntry>,
    ttl: Duration,
}

impl UserCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, id: UserId) -> Option<User> {
        let user = {
            let entry = self.entries.get(&id)?;
            (entry.created_at.elapsed() < self.ttl).then(|| entry.user.clone())
        };
        if user.is_none() {
            self.entries
                .remove_if(&id, |_, entry| entry.created_at.elapsed() >= self.ttl);
        }
        user
    }

    pub fn insert(&self, user: User) {
        self.entries.insert(
            user.id,
            CacheEntry {
                user,
                created_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, id: UserId) {
        self.entries.remove(&id);
    }

    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
