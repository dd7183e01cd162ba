use crate::config::{notification_key, notifications_key};
use crate::core::db::{Store, StoreExt};
use crate::core::helpers::{new_id, now};
use crate::models::models::{Notification, NotificationType};

/// Append-only log of notifications, indexed by recipient.
pub struct NotificationStore<'a> {
    kv: &'a dyn Store,
}

impl<'a> NotificationStore<'a> {
    pub fn new(kv: &'a dyn Store) -> Self {
        Self { kv }
    }

    pub fn insert(&self, from: &str, to: &str, kind: NotificationType) -> anyhow::Result<Notification> {
        let notification = Notification {
            id: new_id(),
            from: from.to_string(),
            to: to.to_string(),
            kind,
            read: false,
            created_at: now(),
        };
        self.kv
            .set_json(&notification_key(&notification.id), &notification)?;
        self.kv.upsert_json::<Vec<String>, _>(&notifications_key(to), |ids| {
            ids.push(notification.id.clone())
        })?;
        Ok(notification)
    }

    /// Oldest first.
    pub fn list_for(&self, recipient: &str) -> anyhow::Result<Vec<Notification>> {
        let ids: Vec<String> = self
            .kv
            .get_json(&notifications_key(recipient))?
            .unwrap_or_default();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(n) = self.kv.get_json(&notification_key(&id))? {
                out.push(n);
            }
        }
        Ok(out)
    }

    /// Marks exactly `ids` read. Returns how many flipped from unread to read.
    pub fn mark_read(&self, ids: &[String]) -> anyhow::Result<usize> {
        let mut flipped = 0;
        for id in ids {
            let changed = self
                .kv
                .update_json(&notification_key(id), |n: &mut Notification| {
                    !std::mem::replace(&mut n.read, true)
                })?;
            if changed == Some(true) {
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    pub fn delete_all_for(&self, recipient: &str) -> anyhow::Result<usize> {
        let index = notifications_key(recipient);
        let ids: Vec<String> = self.kv.get_json(&index)?.unwrap_or_default();
        for id in &ids {
            self.kv.delete(&notification_key(id))?;
        }
        // drop only what was deleted; entries appended meanwhile survive
        self.kv
            .upsert_json::<Vec<String>, _>(&index, |current| current.retain(|id| !ids.contains(id)))?;
        Ok(ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::MemoryStore;

    #[test]
    fn insert_list_mark_delete() {
        let kv = MemoryStore::new();
        let store = NotificationStore::new(&kv);
        store.insert("a", "b", NotificationType::Follow).unwrap();
        store.insert("c", "b", NotificationType::Like).unwrap();
        store.insert("b", "a", NotificationType::Bookmark).unwrap();

        let for_b = store.list_for("b").unwrap();
        assert_eq!(for_b.len(), 2);
        assert_eq!(for_b[0].kind, NotificationType::Follow);
        assert!(for_b.iter().all(|n| !n.read));

        let ids: Vec<String> = for_b.iter().map(|n| n.id.clone()).collect();
        assert_eq!(store.mark_read(&ids).unwrap(), 2);
        assert_eq!(store.mark_read(&ids).unwrap(), 0);
        assert!(store.list_for("b").unwrap().iter().all(|n| n.read));

        assert_eq!(store.delete_all_for("b").unwrap(), 2);
        assert!(store.list_for("b").unwrap().is_empty());
        assert_eq!(store.list_for("a").unwrap().len(), 1);
    }
}
