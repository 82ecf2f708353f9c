use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pagination::Cursored;

pub type UserId = i64;
pub type PostId = i64;

const MAX_NAME_LEN: usize = 100;
const MAX_TITLE_LEN: usize = 100;
const MAX_CONTENT_LEN: usize = 1000;
const MAX_TAGS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    // false until the invitation token is redeemed
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Post joined with its author, as listed in feeds and profiles
#[derive(Debug, Clone, PartialEq)]
pub struct PostWithAuthor {
    pub post: Post,
    pub author: User,
}

impl Cursored for PostWithAuthor {
    fn created_at(&self) -> DateTime<Utc> {
        self.post.created_at
    }

    fn tie_break(&self) -> i64 {
        self.post.id
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len == 0 || len > max {
        return Err(format!("{field} must be between 1 and {max} characters"));
    }
    Ok(())
}

// Request payloads

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUserPayload {
    pub username: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl RegisterUserPayload {
    pub fn validate(&self) -> Result<(), String> {
        check_len("username", &self.username, MAX_NAME_LEN)?;
        if self.username.chars().any(char::is_whitespace) {
            return Err("username must not contain whitespace".to_string());
        }
        check_len("first_name", &self.first_name, MAX_NAME_LEN)?;
        if self.last_name.chars().count() > MAX_NAME_LEN {
            return Err(format!("last_name must be at most {MAX_NAME_LEN} characters"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostPayload {
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreatePostPayload {
    pub fn validate(&self) -> Result<(), String> {
        check_len("title", &self.title, MAX_TITLE_LEN)?;
        check_len("content", &self.content, MAX_CONTENT_LEN)?;
        if self.tags.len() > MAX_TAGS {
            return Err(format!("at most {MAX_TAGS} tags are allowed"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostPayload {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl UpdatePostPayload {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            check_len("title", title, MAX_TITLE_LEN)?;
        }
        if let Some(content) = &self.content {
            check_len("content", content, MAX_CONTENT_LEN)?;
        }
        Ok(())
    }
}

// Query string for listing endpoints. Kept as raw strings so the paginator
// owns validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<String>,
    pub cursor: Option<String>,
}

// Responses

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_name: String,
    pub is_active: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_active: user.is_active,
        }
    }
}

/// Answer to a registration. The invitation token is handed back directly
/// instead of being mailed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostResponse {
    pub id: PostId,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
}

impl From<&Post> for PostResponse {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id,
            title: post.title.clone(),
            content: post.content.clone(),
            tags: post.tags.clone(),
            created_at: post.created_at,
            updated_at: post.updated_at,
            user: None,
        }
    }
}

impl From<&PostWithAuthor> for PostResponse {
    fn from(row: &PostWithAuthor) -> Self {
        Self {
            user: Some(UserResponse::from(&row.author)),
            ..PostResponse::from(&row.post)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedResponse {
    pub posts: Vec<PostResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPostsResponse {
    pub user: UserResponse,
    pub posts: Vec<PostResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_payload_rules() {
        let mut payload = RegisterUserPayload {
            username: "hutao".to_string(),
            first_name: "Hu".to_string(),
            last_name: String::new(),
        };
        assert!(payload.validate().is_ok());

        payload.username = "hu tao".to_string();
        assert!(payload.validate().is_err());

        payload.username = String::new();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn post_payload_rules() {
        let payload = CreatePostPayload {
            user_id: 1,
            title: "t".to_string(),
            content: "x".repeat(MAX_CONTENT_LEN + 1),
            tags: vec![],
        };
        assert!(payload.validate().is_err());

        let payload = CreatePostPayload {
            user_id: 1,
            title: "t".to_string(),
            content: "c".to_string(),
            tags: vec!["a".to_string(); MAX_TAGS + 1],
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn empty_update_is_valid_but_empty_title_is_not() {
        assert!(UpdatePostPayload::default().validate().is_ok());
        let payload = UpdatePostPayload {
            title: Some(String::new()),
            content: None,
        };
        assert!(payload.validate().is_err());
    }
}
