//! Typed adapters over the key-value [`Store`](crate::core::db::Store): one per
//! collection. Every set mutation touches exactly one document and is atomic on it.

mod notifications;
mod posts;
mod users;

pub use notifications::NotificationStore;
pub use posts::{PostSet, PostStore};
pub use users::{UserSet, UserStore};

/// Appends `value` unless it is already present. Returns whether it was inserted.
pub(crate) fn add_unique(set: &mut Vec<String>, value: &str) -> bool {
    if set.iter().any(|v| v == value) {
        return false;
    }
    set.push(value.to_string());
    true
}

/// Removes every occurrence of `value`. Returns whether anything was removed.
pub(crate) fn remove_all(set: &mut Vec<String>, value: &str) -> bool {
    let before = set.len();
    set.retain(|v| v != value);
    set.len() != before
}
