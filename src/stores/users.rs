use crate::config::{email_key, user_key, username_key, USERS_LIST_KEY};
use crate::core::db::{Store, StoreExt};
use crate::core::helpers::{new_id, now};
use crate::models::models::{NewUser, User};

use super::{add_unique, remove_all};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSet {
    Followers,
    Following,
    LikedPosts,
    BookmarkedPosts,
}

impl UserSet {
    fn of(self, user: &mut User) -> &mut Vec<String> {
        match self {
            UserSet::Followers => &mut user.followers,
            UserSet::Following => &mut user.following,
            UserSet::LikedPosts => &mut user.liked_posts,
            UserSet::BookmarkedPosts => &mut user.bookmarked_posts,
        }
    }
}

pub struct UserStore<'a> {
    kv: &'a dyn Store,
}

/// Points a unique index entry at `owner` if nobody holds it yet.
fn claim(kv: &dyn Store, key: &str, owner: &str) -> anyhow::Result<bool> {
    let mut claimed = false;
    kv.update(key, &mut |current| {
        if current.is_some() {
            return Ok(None);
        }
        claimed = true;
        Ok(Some(serde_json::to_vec(owner)?))
    })?;
    Ok(claimed)
}

impl<'a> UserStore<'a> {
    pub fn new(kv: &'a dyn Store) -> Self {
        Self { kv }
    }

    pub fn get(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        self.kv.get_json(&user_key(user_id))
    }

    fn find_by_index(&self, index_key: &str) -> anyhow::Result<Option<User>> {
        match self.kv.get_json::<String>(index_key)? {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }

    pub fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        self.find_by_index(&username_key(username))
    }

    pub fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.find_by_index(&email_key(email))
    }

    /// Returns `None` when the username or email is already taken.
    pub fn insert(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let id = new_id();
        if !claim(self.kv, &username_key(&new.username), &id)? {
            return Ok(None);
        }
        if !claim(self.kv, &email_key(&new.email), &id)? {
            self.kv.delete(&username_key(&new.username))?;
            return Ok(None);
        }

        let user = User {
            id: id.clone(),
            username: new.username,
            full_name: new.full_name,
            email: new.email,
            password: new.password_hash,
            bio: None,
            link: None,
            profile_img: None,
            cover_img: None,
            followers: Vec::new(),
            following: Vec::new(),
            liked_posts: Vec::new(),
            bookmarked_posts: Vec::new(),
            created_at: now(),
            updated_at: None,
        };
        self.kv.set_json(&user_key(&id), &user)?;
        self.kv
            .upsert_json::<Vec<String>, _>(USERS_LIST_KEY, |ids| add_unique(ids, &id))?;

        Ok(Some(user))
    }

    /// Applies `f` to the stored record and returns the result, or `None` if the user
    /// does not exist.
    pub fn modify(&self, user_id: &str, f: impl FnOnce(&mut User)) -> anyhow::Result<Option<User>> {
        self.kv.update_json(&user_key(user_id), |user: &mut User| {
            f(user);
            user.updated_at = Some(now());
            user.clone()
        })
    }

    /// Moves the username index from `old` to `new`. Returns `false` if `new` is taken.
    /// The record itself is not touched.
    pub fn rename(&self, user_id: &str, old: &str, new: &str) -> anyhow::Result<bool> {
        self.reindex(&username_key(old), &username_key(new), user_id)
    }

    /// Moves the email index from `old` to `new`. Returns `false` if `new` is taken.
    pub fn change_email(&self, user_id: &str, old: &str, new: &str) -> anyhow::Result<bool> {
        self.reindex(&email_key(old), &email_key(new), user_id)
    }

    fn reindex(&self, old_key: &str, new_key: &str, user_id: &str) -> anyhow::Result<bool> {
        if old_key == new_key {
            return Ok(true);
        }
        if !claim(self.kv, new_key, user_id)? {
            return Ok(false);
        }
        self.kv.delete(old_key)?;
        Ok(true)
    }

    pub fn all_ids(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.kv.get_json(USERS_LIST_KEY)?.unwrap_or_default())
    }

    /// Set-semantics add. `false` if `value` was already a member or the user is gone.
    pub fn add_to_set(&self, user_id: &str, set: UserSet, value: &str) -> anyhow::Result<bool> {
        Ok(self
            .kv
            .update_json(&user_key(user_id), |user: &mut User| add_unique(set.of(user), value))?
            .unwrap_or(false))
    }

    /// `false` if `value` was not a member or the user is gone.
    pub fn pull(&self, user_id: &str, set: UserSet, value: &str) -> anyhow::Result<bool> {
        Ok(self
            .kv
            .update_json(&user_key(user_id), |user: &mut User| remove_all(set.of(user), value))?
            .unwrap_or(false))
    }

    /// Empties the set and returns what it held.
    pub fn clear(&self, user_id: &str, set: UserSet) -> anyhow::Result<Vec<String>> {
        Ok(self
            .kv
            .update_json(&user_key(user_id), |user: &mut User| std::mem::take(set.of(user)))?
            .unwrap_or_default())
    }
}
