use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
    pub link: Option<String>,
    pub profile_img: Option<String>,
    pub cover_img: Option<String>,
    #[serde(default)]
    pub followers: Vec<String>,
    #[serde(default)]
    pub following: Vec<String>,
    #[serde(default)]
    pub liked_posts: Vec<String>,
    #[serde(default)]
    pub bookmarked_posts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
}

/// Every user field except the password hash.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub bio: Option<String>,
    pub link: Option<String>,
    pub profile_img: Option<String>,
    pub cover_img: Option<String>,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    pub liked_posts: Vec<String>,
    pub bookmarked_posts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            bio: user.bio,
            link: user.link,
            profile_img: user.profile_img,
            cover_img: user.cover_img,
            followers: user.followers,
            following: user.following,
            liked_posts: user.liked_posts,
            bookmarked_posts: user.bookmarked_posts,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Minimal author fields joined into posts, comments and notifications.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub profile_img: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            profile_img: user.profile_img.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub text: Option<String>,
    pub img: Option<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub bookmarks: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct NewPost {
    pub user_id: String,
    pub text: Option<String>,
    pub img: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub user: Option<UserSummary>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A post with its owner and comment authors joined in.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub user: Option<UserSummary>,
    pub text: Option<String>,
    pub img: Option<String>,
    pub likes: Vec<String>,
    pub bookmarks: Vec<String>,
    pub comments: Vec<CommentView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Follow,
    Like,
    Bookmark,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    pub from: Option<UserSummary>,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}
