//! Read-only post listings with authors joined in.

use std::collections::HashMap;

use crate::core::db::Store;
use crate::core::errors::{ApiError, ApiResult};
use crate::models::models::{CommentView, Post, PostView, UserSummary};
use crate::stores::{PostStore, UserStore};

/// Resolves user ids to summaries, reading each user at most once per listing.
struct Joiner<'a> {
    users: UserStore<'a>,
    cache: HashMap<String, Option<UserSummary>>,
}

impl<'a> Joiner<'a> {
    fn new(kv: &'a dyn Store) -> Self {
        Self {
            users: UserStore::new(kv),
            cache: HashMap::new(),
        }
    }

    fn summary(&mut self, user_id: &str) -> anyhow::Result<Option<UserSummary>> {
        if let Some(hit) = self.cache.get(user_id) {
            return Ok(hit.clone());
        }
        let summary = self.users.get(user_id)?.as_ref().map(UserSummary::from);
        self.cache.insert(user_id.to_string(), summary.clone());
        Ok(summary)
    }

    fn view(&mut self, post: Post) -> anyhow::Result<PostView> {
        let mut comments = Vec::with_capacity(post.comments.len());
        for comment in post.comments {
            comments.push(CommentView {
                user: self.summary(&comment.user_id)?,
                id: comment.id,
                text: comment.text,
                created_at: comment.created_at,
            });
        }

        Ok(PostView {
            user: self.summary(&post.user_id)?,
            id: post.id,
            text: post.text,
            img: post.img,
            likes: post.likes,
            bookmarks: post.bookmarks,
            comments,
            created_at: post.created_at,
            updated_at: post.updated_at,
        })
    }

    fn views(&mut self, posts: Vec<Post>) -> anyhow::Result<Vec<PostView>> {
        posts.into_iter().map(|p| self.view(p)).collect()
    }
}

pub fn view_of(kv: &dyn Store, post: Post) -> ApiResult<PostView> {
    Ok(Joiner::new(kv).view(post)?)
}

/// Newest first. The feed is already newest first, so the stable sort only fixes up
/// out-of-order ids and keeps ties in feed order.
fn newest_first(kv: &dyn Store, keep: impl Fn(&Post) -> bool) -> ApiResult<Vec<PostView>> {
    let mut posts: Vec<Post> = PostStore::new(kv).all()?.into_iter().filter(|p| keep(p)).collect();
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Joiner::new(kv).views(posts)?)
}

pub fn list_all(kv: &dyn Store) -> ApiResult<Vec<PostView>> {
    newest_first(kv, |_| true)
}

pub fn get_post(kv: &dyn Store, post_id: &str) -> ApiResult<PostView> {
    let post = PostStore::new(kv)
        .get(post_id)?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;
    view_of(kv, post)
}

pub fn list_following(kv: &dyn Store, user_id: &str) -> ApiResult<Vec<PostView>> {
    let user = UserStore::new(kv)
        .get(user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    newest_first(kv, |p| user.following.contains(&p.user_id))
}

/// Ordered by post creation, not by when the like happened.
pub fn list_liked(kv: &dyn Store, user_id: &str) -> ApiResult<Vec<PostView>> {
    let user = UserStore::new(kv)
        .get(user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    newest_first(kv, |p| user.liked_posts.contains(&p.id))
}

/// In bookmark order: oldest bookmark first, as stored on the user.
pub fn list_bookmarked(kv: &dyn Store, user_id: &str) -> ApiResult<Vec<PostView>> {
    let user = UserStore::new(kv)
        .get(user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let posts = PostStore::new(kv);
    let mut found = Vec::with_capacity(user.bookmarked_posts.len());
    for post_id in &user.bookmarked_posts {
        if let Some(post) = posts.get(post_id)? {
            found.push(post);
        }
    }
    Ok(Joiner::new(kv).views(found)?)
}

pub fn list_by_author_username(kv: &dyn Store, username: &str) -> ApiResult<Vec<PostView>> {
    let user = UserStore::new(kv)
        .find_by_username(username)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    newest_first(kv, |p| p.user_id == user.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::MemoryStore;
    use crate::interactions::{bookmark_unbookmark, comment_on_post, follow_unfollow, like_unlike};
    use crate::models::models::{NewPost, NewUser};

    fn user(kv: &MemoryStore, username: &str) -> String {
        UserStore::new(kv)
            .insert(NewUser {
                username: username.to_string(),
                full_name: format!("{username} full"),
                email: format!("{username}@example.com"),
                password_hash: "secret-hash".to_string(),
            })
            .unwrap()
            .unwrap()
            .id
    }

    fn post(kv: &MemoryStore, owner: &str, text: &str) -> String {
        PostStore::new(kv)
            .insert(NewPost {
                user_id: owner.to_string(),
                text: Some(text.to_string()),
                img: None,
            })
            .unwrap()
            .id
    }

    fn texts(views: &[PostView]) -> Vec<&str> {
        views.iter().filter_map(|v| v.text.as_deref()).collect()
    }

    #[test]
    fn all_posts_newest_first_with_authors() {
        let kv = MemoryStore::new();
        let (alice, bob) = (user(&kv, "alice"), user(&kv, "bob"));
        let first = post(&kv, &alice, "first");
        post(&kv, &bob, "second");
        comment_on_post(&kv, &bob, &first, "nice").unwrap();

        let views = list_all(&kv).unwrap();
        assert_eq!(texts(&views), vec!["second", "first"]);
        assert_eq!(views[1].user.as_ref().unwrap().username, "alice");
        assert_eq!(views[1].comments[0].user.as_ref().unwrap().username, "bob");

        let json = serde_json::to_string(&views).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn following_feed_only_has_followed_authors() {
        let kv = MemoryStore::new();
        let (alice, bob, carol) = (user(&kv, "alice"), user(&kv, "bob"), user(&kv, "carol"));
        post(&kv, &bob, "from bob");
        post(&kv, &carol, "from carol");
        follow_unfollow(&kv, &alice, &bob).unwrap();

        assert_eq!(texts(&list_following(&kv, &alice).unwrap()), vec!["from bob"]);
        assert!(matches!(list_following(&kv, "ghost"), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn liked_and_bookmarked_feeds() {
        let kv = MemoryStore::new();
        let (alice, bob) = (user(&kv, "alice"), user(&kv, "bob"));
        let older = post(&kv, &alice, "older");
        let newer = post(&kv, &alice, "newer");
        post(&kv, &alice, "ignored");

        like_unlike(&kv, &bob, &older).unwrap();
        like_unlike(&kv, &bob, &newer).unwrap();
        assert_eq!(texts(&list_liked(&kv, &bob).unwrap()), vec!["newer", "older"]);

        bookmark_unbookmark(&kv, &bob, &older).unwrap();
        bookmark_unbookmark(&kv, &bob, &newer).unwrap();
        assert_eq!(texts(&list_bookmarked(&kv, &bob).unwrap()), vec!["older", "newer"]);
    }

    #[test]
    fn by_username_resolves_author() {
        let kv = MemoryStore::new();
        let (alice, bob) = (user(&kv, "alice"), user(&kv, "bob"));
        post(&kv, &alice, "a1");
        post(&kv, &bob, "b1");
        post(&kv, &alice, "a2");

        assert_eq!(texts(&list_by_author_username(&kv, "alice").unwrap()), vec!["a2", "a1"]);
        assert!(matches!(list_by_author_username(&kv, "nobody"), Err(ApiError::NotFound(_))));
        assert!(matches!(get_post(&kv, "missing"), Err(ApiError::NotFound(_))));
    }
}
