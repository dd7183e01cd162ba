use actix_web::{web, HttpResponse};

use crate::auth::AuthUser;
use crate::core::db::Store;
use crate::core::errors::ApiResult;
use crate::models::models::{NotificationView, UserSummary};
use crate::stores::{NotificationStore, UserStore};
use crate::AppState;

/// Oldest first, with the sender joined in. Only the returned entries are marked read
/// afterwards; anything that arrives meanwhile stays unread for the next call.
pub fn list_for_recipient(kv: &dyn Store, user_id: &str) -> ApiResult<Vec<NotificationView>> {
    let store = NotificationStore::new(kv);
    let users = UserStore::new(kv);

    let listed = store.list_for(user_id)?;
    let ids: Vec<String> = listed.iter().map(|n| n.id.clone()).collect();

    let mut views = Vec::with_capacity(listed.len());
    for n in listed {
        views.push(NotificationView {
            from: users.get(&n.from)?.as_ref().map(UserSummary::from),
            id: n.id,
            to: n.to,
            kind: n.kind,
            read: n.read,
            created_at: n.created_at,
        });
    }

    let flipped = store.mark_read(&ids)?;
    tracing::debug!(user = user_id, flipped, "marked notifications read");

    Ok(views)
}

pub fn delete_all_for_recipient(kv: &dyn Store, user_id: &str) -> ApiResult<usize> {
    let removed = NotificationStore::new(kv).delete_all_for(user_id)?;
    tracing::info!(user = user_id, removed, "deleted notifications");
    Ok(removed)
}

// === HTTP Handlers ===

pub async fn get_notifications(state: web::Data<AppState>, auth: AuthUser) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(list_for_recipient(state.kv(), &auth.user_id)?))
}

pub async fn delete_notifications(state: web::Data<AppState>, auth: AuthUser) -> ApiResult<HttpResponse> {
    delete_all_for_recipient(state.kv(), &auth.user_id)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Notifications deleted successfully"
    })))
}
