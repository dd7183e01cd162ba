//! Multi-document social mutations: follow, like, bookmark, comment, post lifecycle.
//!
//! Every operation that touches two collections issues independent single-document
//! writes in a fixed order. There is no transaction around them, so a reader can
//! briefly observe one side updated and the other not. Set mutations are idempotent,
//! which keeps racing toggles from duplicating memberships, and notifications are
//! emitted only when an insert actually happened.

use serde::Serialize;

use crate::core::db::Store;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{filter_post_content, sanitize_text};
use crate::core::images::ImageStore;
use crate::core::validation::{validate_post_input, PostInput};
use crate::models::models::{NewPost, NotificationType, Post};
use crate::stores::{NotificationStore, PostSet, PostStore, UserSet, UserStore};

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FollowOutcome {
    pub message: &'static str,
    pub user_id: String,
    pub following: bool,
}

pub fn follow_unfollow(kv: &dyn Store, actor_id: &str, target_id: &str) -> ApiResult<FollowOutcome> {
    if actor_id == target_id {
        return Err(ApiError::InvalidOperation(
            "You cannot follow or unfollow yourself".to_string(),
        ));
    }

    let users = UserStore::new(kv);
    let actor = users
        .get(actor_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if users.get(target_id)?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    if actor.following.iter().any(|id| id == target_id) {
        users.pull(target_id, UserSet::Followers, actor_id)?;
        users.pull(actor_id, UserSet::Following, target_id)?;
        tracing::info!(actor = actor_id, target = target_id, "unfollowed");

        return Ok(FollowOutcome {
            message: "User unfollowed successfully",
            user_id: target_id.to_string(),
            following: false,
        });
    }

    users.add_to_set(target_id, UserSet::Followers, actor_id)?;
    let inserted = users.add_to_set(actor_id, UserSet::Following, target_id)?;
    if inserted {
        NotificationStore::new(kv).insert(actor_id, target_id, NotificationType::Follow)?;
    }
    tracing::info!(actor = actor_id, target = target_id, "followed");

    Ok(FollowOutcome {
        message: "User followed successfully",
        user_id: target_id.to_string(),
        following: true,
    })
}

/// The two mirrored sets a toggle keeps in step, plus what to tell the post owner.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Toggle {
    post_set: PostSet,
    user_set: UserSet,
    notification: NotificationType,
}

pub(crate) const LIKE: Toggle = Toggle {
    post_set: PostSet::Likes,
    user_set: UserSet::LikedPosts,
    notification: NotificationType::Like,
};

pub(crate) const BOOKMARK: Toggle = Toggle {
    post_set: PostSet::Bookmarks,
    user_set: UserSet::BookmarkedPosts,
    notification: NotificationType::Bookmark,
};

/// Toggles the actor's like on a post and returns the resulting `likes`.
pub fn like_unlike(kv: &dyn Store, actor_id: &str, post_id: &str) -> ApiResult<Vec<String>> {
    let post = load_post(kv, post_id)?;
    apply_toggle(kv, actor_id, &post, LIKE)
}

/// Toggles the actor's bookmark on a post and returns the resulting `bookmarks`.
pub fn bookmark_unbookmark(kv: &dyn Store, actor_id: &str, post_id: &str) -> ApiResult<Vec<String>> {
    let post = load_post(kv, post_id)?;
    apply_toggle(kv, actor_id, &post, BOOKMARK)
}

/// Decides add vs. remove from `snapshot`, then applies targeted set mutations. The
/// result is computed from the snapshot, not re-read.
pub(crate) fn apply_toggle(
    kv: &dyn Store,
    actor_id: &str,
    snapshot: &Post,
    toggle: Toggle,
) -> ApiResult<Vec<String>> {
    let posts = PostStore::new(kv);
    let users = UserStore::new(kv);

    let mut members = match toggle.post_set {
        PostSet::Likes => snapshot.likes.clone(),
        PostSet::Bookmarks => snapshot.bookmarks.clone(),
    };

    if members.iter().any(|id| id == actor_id) {
        posts.pull(&snapshot.id, toggle.post_set, actor_id)?;
        users.pull(actor_id, toggle.user_set, &snapshot.id)?;
        members.retain(|id| id != actor_id);
        tracing::info!(actor = actor_id, post = %snapshot.id, set = ?toggle.post_set, "removed");
        return Ok(members);
    }

    // a post deleted since the snapshot must not leave its id on the user
    let inserted = posts
        .add_to_set(&snapshot.id, toggle.post_set, actor_id)?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;
    users.add_to_set(actor_id, toggle.user_set, &snapshot.id)?;
    if posts.get(&snapshot.id)?.is_none() {
        // deleted between the two writes; its cleanup may have missed us
        users.pull(actor_id, toggle.user_set, &snapshot.id)?;
        return Err(ApiError::not_found("Post not found"));
    }
    if inserted {
        NotificationStore::new(kv).insert(actor_id, &snapshot.user_id, toggle.notification)?;
    }
    members.push(actor_id.to_string());
    tracing::info!(actor = actor_id, post = %snapshot.id, set = ?toggle.post_set, "added");

    Ok(members)
}

fn load_post(kv: &dyn Store, post_id: &str) -> ApiResult<Post> {
    PostStore::new(kv)
        .get(post_id)?
        .ok_or_else(|| ApiError::not_found("Post not found"))
}

pub fn comment_on_post(kv: &dyn Store, actor_id: &str, post_id: &str, text: &str) -> ApiResult<Post> {
    let text = sanitize_text(text.trim());
    if text.is_empty() {
        return Err(ApiError::validation("Text field is required"));
    }

    let post = PostStore::new(kv)
        .push_comment(post_id, actor_id, text)?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;
    tracing::info!(actor = actor_id, post = post_id, "commented");

    Ok(post)
}

pub fn create_post(
    kv: &dyn Store,
    images: &dyn ImageStore,
    actor_id: &str,
    input: &PostInput,
) -> ApiResult<Post> {
    let valid = validate_post_input(input).map_err(ApiError::Validation)?;

    let img = match valid.img {
        Some(raw) => Some(images.store(&raw).map_err(|e| {
            ApiError::DependencyFailure(format!("Image upload failed: {e}"))
        })?),
        None => None,
    };

    let post = PostStore::new(kv).insert(NewPost {
        user_id: actor_id.to_string(),
        text: valid.text.as_deref().map(filter_post_content),
        img,
    })?;
    tracing::info!(actor = actor_id, post = %post.id, "created post");

    Ok(post)
}

/// Owner-only. Releases the image (best effort), drops the post from its bookmarkers'
/// lists, then removes the record.
pub fn delete_post(
    kv: &dyn Store,
    images: &dyn ImageStore,
    actor_id: &str,
    post_id: &str,
) -> ApiResult<()> {
    let posts = PostStore::new(kv);
    let users = UserStore::new(kv);

    let post = load_post(kv, post_id)?;
    if post.user_id != actor_id {
        return Err(ApiError::Forbidden(
            "You are not authorized to delete this post".to_string(),
        ));
    }

    if let Some(img) = &post.img {
        if let Err(e) = images.release(img) {
            tracing::warn!(post = post_id, image = %img, error = %e, "failed to release image");
        }
    }

    for user_id in &post.bookmarks {
        users.pull(user_id, UserSet::BookmarkedPosts, post_id)?;
    }

    posts.delete(post_id)?;
    tracing::info!(actor = actor_id, post = post_id, "deleted post");

    Ok(())
}

/// Empties the actor's bookmark list, then removes the actor from every post's
/// `bookmarks`. Returns how many bookmarks the user held.
pub fn delete_all_bookmarks(kv: &dyn Store, actor_id: &str) -> ApiResult<usize> {
    let posts = PostStore::new(kv);
    let cleared = UserStore::new(kv).clear(actor_id, UserSet::BookmarkedPosts)?;

    for post_id in posts.feed_ids()? {
        posts.pull(&post_id, PostSet::Bookmarks, actor_id)?;
    }
    tracing::info!(actor = actor_id, count = cleared.len(), "cleared bookmarks");

    Ok(cleared.len())
}
