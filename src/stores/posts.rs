use crate::config::{post_key, FEED_KEY};
use crate::core::db::{Store, StoreExt};
use crate::core::helpers::{new_id, now};
use crate::models::models::{Comment, NewPost, Post};

use super::{add_unique, remove_all};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostSet {
    Likes,
    Bookmarks,
}

impl PostSet {
    fn of(self, post: &mut Post) -> &mut Vec<String> {
        match self {
            PostSet::Likes => &mut post.likes,
            PostSet::Bookmarks => &mut post.bookmarks,
        }
    }
}

pub struct PostStore<'a> {
    kv: &'a dyn Store,
}

impl<'a> PostStore<'a> {
    pub fn new(kv: &'a dyn Store) -> Self {
        Self { kv }
    }

    pub fn get(&self, post_id: &str) -> anyhow::Result<Option<Post>> {
        self.kv.get_json(&post_key(post_id))
    }

    pub fn insert(&self, new: NewPost) -> anyhow::Result<Post> {
        let post = Post {
            id: new_id(),
            user_id: new.user_id,
            text: new.text,
            img: new.img,
            likes: Vec::new(),
            bookmarks: Vec::new(),
            comments: Vec::new(),
            created_at: now(),
            updated_at: None,
        };
        self.kv.set_json(&post_key(&post.id), &post)?;

        // feed holds ids newest first
        self.kv
            .upsert_json::<Vec<String>, _>(FEED_KEY, |feed| feed.insert(0, post.id.clone()))?;

        Ok(post)
    }

    pub fn delete(&self, post_id: &str) -> anyhow::Result<()> {
        self.kv.delete(&post_key(post_id))?;
        self.kv
            .upsert_json::<Vec<String>, _>(FEED_KEY, |feed| remove_all(feed, post_id))?;
        Ok(())
    }

    pub fn feed_ids(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.kv.get_json(FEED_KEY)?.unwrap_or_default())
    }

    /// Every post in feed order. Ids whose record has vanished are skipped.
    pub fn all(&self) -> anyhow::Result<Vec<Post>> {
        let mut posts = Vec::new();
        for id in self.feed_ids()? {
            if let Some(post) = self.get(&id)? {
                posts.push(post);
            }
        }
        Ok(posts)
    }

    /// Set-semantics add. `Some(false)` if already a member, `None` if the post is gone.
    pub fn add_to_set(&self, post_id: &str, set: PostSet, user_id: &str) -> anyhow::Result<Option<bool>> {
        self.kv
            .update_json(&post_key(post_id), |post: &mut Post| add_unique(set.of(post), user_id))
    }

    pub fn pull(&self, post_id: &str, set: PostSet, user_id: &str) -> anyhow::Result<bool> {
        Ok(self
            .kv
            .update_json(&post_key(post_id), |post: &mut Post| remove_all(set.of(post), user_id))?
            .unwrap_or(false))
    }

    /// Appends a comment and returns the updated post, or `None` if it is gone.
    pub fn push_comment(&self, post_id: &str, user_id: &str, text: String) -> anyhow::Result<Option<Post>> {
        self.kv.update_json(&post_key(post_id), |post: &mut Post| {
            post.comments.push(Comment {
                id: new_id(),
                user_id: user_id.to_string(),
                text,
                created_at: now(),
            });
            post.clone()
        })
    }
}
