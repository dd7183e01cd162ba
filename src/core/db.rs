//! Key-value document store.
//!
//! Records are JSON documents addressed by namespaced keys (see [`crate::config`]).
//! The only concurrency guarantee is per key: [`Store::update`] is a read-modify-write
//! that no other writer of the same key can interleave with. Nothing spans two keys.

use anyhow::Context;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::models::{NewPost, NewUser};
use crate::stores::{PostStore, UserSet, UserStore};

pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Atomically rewrites `key`. `f` sees the current bytes (if any) and returns the
    /// bytes to store, or `None` to leave the key untouched.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> anyhow::Result<Option<Vec<u8>>>,
    ) -> anyhow::Result<()>;
}

pub trait StoreExt: Store {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("corrupt document at {key}"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.set(key, &serde_json::to_vec(value)?)
    }

    /// Mutates an existing document in place. Returns `None` when the key is absent.
    fn update_json<T, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> anyhow::Result<Option<R>>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut f = Some(f);
        let mut out = None;
        self.update(key, &mut |current| {
            let Some(bytes) = current else {
                return Ok(None);
            };
            let mut doc: T = serde_json::from_slice(bytes)
                .with_context(|| format!("corrupt document at {key}"))?;
            if let Some(f) = f.take() {
                out = Some(f(&mut doc));
            }
            Ok(Some(serde_json::to_vec(&doc)?))
        })?;
        Ok(out)
    }

    /// Like [`StoreExt::update_json`] but starts from `T::default()` when the key is absent.
    fn upsert_json<T, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> anyhow::Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let mut f = Some(f);
        let mut out = None;
        self.update(key, &mut |current| {
            let mut doc: T = match current {
                Some(bytes) => serde_json::from_slice(bytes)
                    .with_context(|| format!("corrupt document at {key}"))?,
                None => T::default(),
            };
            if let Some(f) = f.take() {
                out = Some(f(&mut doc));
            }
            Ok(Some(serde_json::to_vec(&doc)?))
        })?;
        out.ok_or_else(|| anyhow::anyhow!("update of {key} was not applied"))
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

/// In-process store. Each key lives in a dashmap shard, so updates to one key are
/// serialized while unrelated keys proceed in parallel.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> anyhow::Result<Option<Vec<u8>>>,
    ) -> anyhow::Result<()> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if let Some(next) = f(Some(entry.get().as_slice()))? {
                    *entry.get_mut() = next;
                }
            }
            Entry::Vacant(entry) => {
                if let Some(next) = f(None)? {
                    entry.insert(next);
                }
            }
        }
        Ok(())
    }
}

/// Creates the demo accounts `test`, `alice` and `bob` (password = username) with a few
/// posts, and makes `test` follow `bob`. Accounts that already exist are left alone.
pub fn seed_demo_data(store: &dyn Store) -> anyhow::Result<()> {
    let users = UserStore::new(store);
    let posts = PostStore::new(store);

    let seeds: [(&str, &str, &[&str]); 3] = [
        ("test", "Test User", &["This is my first post!"]),
        (
            "alice",
            "Alice Liddell",
            &[
                "Welcome to my board! Excited to share thoughts here.",
                "Just finished an amazing project. Feeling productive today!",
            ],
        ),
        (
            "bob",
            "Bob Builder",
            &["Hey everyone! Just joined, looking forward to connecting with you all."],
        ),
    ];

    for (username, full_name, texts) in seeds {
        if users.find_by_username(username)?.is_some() {
            continue;
        }
        let user = users
            .insert(NewUser {
                username: username.to_string(),
                full_name: full_name.to_string(),
                email: format!("{username}@example.com"),
                password_hash: crate::core::helpers::hash_password(username)?,
            })?
            .ok_or_else(|| anyhow::anyhow!("seed user {username} collided with an index"))?;

        for text in texts {
            posts.insert(NewPost {
                user_id: user.id.clone(),
                text: Some(text.to_string()),
                img: None,
            })?;
        }
        tracing::info!(username, "seeded demo user");
    }

    let (follower, followed) = ("test", "bob");
    if let (Some(a), Some(b)) = (users.find_by_username(follower)?, users.find_by_username(followed)?) {
        users.add_to_set(&a.id, UserSet::Following, &b.id)?;
        users.add_to_set(&b.id, UserSet::Followers, &a.id)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn json_round_trip_and_delete() {
        let store = MemoryStore::new();
        store.set_json("k", &vec!["a".to_string()]).unwrap();
        assert_eq!(store.get_json::<Vec<String>>("k").unwrap(), Some(vec!["a".to_string()]));
        store.delete("k").unwrap();
        assert!(store.get_json::<Vec<String>>("k").unwrap().is_none());
    }

    #[test]
    fn update_json_skips_missing_documents() {
        let store = MemoryStore::new();
        let touched = store.update_json::<Vec<String>, _>("missing", |v| v.push("x".into())).unwrap();
        assert!(touched.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn upsert_json_creates_default() {
        let store = MemoryStore::new();
        let len = store
            .upsert_json::<Vec<String>, _>("list", |v| {
                v.push("x".into());
                v.len()
            })
            .unwrap();
        assert_eq!(len, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn concurrent_updates_to_one_key_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store
                            .upsert_json::<Vec<String>, _>("list", |v| v.push(format!("{t}-{i}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let list: Vec<String> = store.get_json("list").unwrap().unwrap();
        assert_eq!(list.len(), 400);
    }

    #[test]
    fn seeding_is_idempotent() {
        let store = MemoryStore::new();
        seed_demo_data(&store).unwrap();
        seed_demo_data(&store).unwrap();

        let users = UserStore::new(&store);
        assert_eq!(users.all_ids().unwrap().len(), 3);
        assert_eq!(PostStore::new(&store).all().unwrap().len(), 4);

        let test = users.find_by_username("test").unwrap().unwrap();
        let bob = users.find_by_username("bob").unwrap().unwrap();
        assert_eq!(test.following, vec![bob.id.clone()]);
        assert_eq!(bob.followers, vec![test.id]);
    }
}
