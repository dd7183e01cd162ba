use actix_web::{web, HttpResponse};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::auth::{issue_token, revoke_all_tokens, AuthUser};
use crate::config::*;
use crate::core::db::Store;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{hash_password, sanitize_text, verify_password};
use crate::core::images::ImageStore;
use crate::core::validation::{
    is_email, is_image_ref, is_link, non_empty, validate_full_name, validate_password,
    validate_username,
};
use crate::interactions;
use crate::models::models::{PublicUser, User};
use crate::stores::UserStore;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInput {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub bio: Option<String>,
    pub link: Option<String>,
    pub profile_img: Option<String>,
    pub cover_img: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateOutcome {
    #[serde(flatten)]
    pub user: PublicUser,
    /// Set when the password changed; every older session is gone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

pub fn get_profile_by_username(kv: &dyn Store, username: &str) -> ApiResult<PublicUser> {
    UserStore::new(kv)
        .find_by_username(username)?
        .map(PublicUser::from)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// Up to `SUGGESTED_USERS_LIMIT` random users the actor does not follow yet.
pub fn suggested_for(kv: &dyn Store, actor_id: &str) -> ApiResult<Vec<PublicUser>> {
    let users = UserStore::new(kv);
    let actor = users
        .get(actor_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let candidates: Vec<String> = users
        .all_ids()?
        .into_iter()
        .filter(|id| id != actor_id && !actor.following.contains(id))
        .collect();

    let picked: Vec<&String> = candidates
        .choose_multiple(&mut rand::thread_rng(), SUGGESTED_USERS_LIMIT)
        .collect();

    let mut suggested = Vec::with_capacity(picked.len());
    for id in picked {
        if let Some(user) = users.get(id)? {
            suggested.push(PublicUser::from(user));
        }
    }
    Ok(suggested)
}

/// Validated changes, computed before anything is written.
#[derive(Default)]
struct Changes {
    full_name: Option<String>,
    username: Option<String>,
    email: Option<String>,
    password_hash: Option<String>,
    bio: Option<String>,
    link: Option<String>,
    profile_img: Option<String>,
    cover_img: Option<String>,
}

fn collect_changes(current: &User, input: &UpdateInput) -> ApiResult<Changes> {
    let mut changes = Changes::default();

    let current_password = input.current_password.as_deref().filter(|p| !p.is_empty());
    let new_password = input.new_password.as_deref().filter(|p| !p.is_empty());
    match (current_password, new_password) {
        (Some(old), Some(new)) => {
            if !verify_password(old, &current.password) {
                return Err(ApiError::validation("Current password is incorrect"));
            }
            validate_password(new).map_err(ApiError::Validation)?;
            changes.password_hash = Some(hash_password(new)?);
        }
        (None, None) => {}
        _ => {
            return Err(ApiError::validation(
                "Please provide both current password and new password",
            ))
        }
    }

    if let Some(full_name) = non_empty(input.full_name.as_deref()) {
        validate_full_name(&full_name).map_err(ApiError::Validation)?;
        changes.full_name = Some(full_name);
    }

    if let Some(username) = non_empty(input.username.as_deref()) {
        if username != current.username {
            validate_username(&username).map_err(ApiError::Validation)?;
            changes.username = Some(username);
        }
    }

    if let Some(email) = non_empty(input.email.as_deref()) {
        if !email.eq_ignore_ascii_case(&current.email) {
            if !is_email(&email) {
                return Err(ApiError::validation("Invalid email format"));
            }
            changes.email = Some(email);
        }
    }

    if let Some(bio) = non_empty(input.bio.as_deref()) {
        let bio = sanitize_text(&bio);
        if bio.chars().count() > MAX_BIO_LENGTH {
            return Err(ApiError::Validation(format!(
                "Bio must be at most {MAX_BIO_LENGTH} characters"
            )));
        }
        changes.bio = Some(bio);
    }

    if let Some(link) = non_empty(input.link.as_deref()) {
        if !is_link(&link) {
            return Err(ApiError::validation("Link must be a valid URL"));
        }
        changes.link = Some(link);
    }

    for (raw, slot) in [
        (&input.profile_img, &mut changes.profile_img),
        (&input.cover_img, &mut changes.cover_img),
    ] {
        if let Some(img) = non_empty(raw.as_deref()) {
            if !is_image_ref(&img) {
                return Err(ApiError::validation("Image must be a valid URI"));
            }
            *slot = Some(img);
        }
    }

    Ok(changes)
}

fn release_quietly(images: &dyn ImageStore, user_id: &str, reference: &str) {
    if let Err(e) = images.release(reference) {
        tracing::warn!(user = user_id, image = reference, error = %e, "failed to release image");
    }
}

/// Applies a profile update. Nothing is written unless every field validates. Unique
/// index moves are undone if a later step fails.
pub fn update_user(
    kv: &dyn Store,
    images: &dyn ImageStore,
    actor_id: &str,
    input: &UpdateInput,
) -> ApiResult<UpdateOutcome> {
    let users = UserStore::new(kv);
    let current = users
        .get(actor_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let mut changes = collect_changes(&current, input)?;

    if let Some(username) = &changes.username {
        if !users.rename(actor_id, &current.username, username)? {
            return Err(ApiError::validation("Username is already taken"));
        }
    }
    if let Some(email) = &changes.email {
        if !users.change_email(actor_id, &current.email, email)? {
            if let Some(username) = &changes.username {
                users.rename(actor_id, username, &current.username)?;
            }
            return Err(ApiError::validation("Email is already taken"));
        }
    }

    let mut stored: Vec<String> = Vec::new();
    for slot in [&mut changes.profile_img, &mut changes.cover_img] {
        let Some(raw) = slot.take() else { continue };
        match images.store(&raw) {
            Ok(reference) => {
                stored.push(reference.clone());
                *slot = Some(reference);
            }
            Err(e) => {
                for reference in &stored {
                    release_quietly(images, actor_id, reference);
                }
                if let Some(email) = &changes.email {
                    users.change_email(actor_id, email, &current.email)?;
                }
                if let Some(username) = &changes.username {
                    users.rename(actor_id, username, &current.username)?;
                }
                return Err(ApiError::DependencyFailure(format!("Image upload failed: {e}")));
            }
        }
    }

    let password_changed = changes.password_hash.is_some();
    let updated = users
        .modify(actor_id, |user| {
            if let Some(v) = changes.full_name.take() {
                user.full_name = v;
            }
            if let Some(v) = changes.username.take() {
                user.username = v;
            }
            if let Some(v) = changes.email.take() {
                user.email = v;
            }
            if let Some(v) = changes.password_hash.take() {
                user.password = v;
            }
            if let Some(v) = changes.bio.take() {
                user.bio = Some(v);
            }
            if let Some(v) = changes.link.take() {
                user.link = Some(v);
            }
            if let Some(v) = changes.profile_img.take() {
                user.profile_img = Some(v);
            }
            if let Some(v) = changes.cover_img.take() {
                user.cover_img = Some(v);
            }
        })?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    // old images go only once the new references are saved
    for (old, new) in [
        (&current.profile_img, &updated.profile_img),
        (&current.cover_img, &updated.cover_img),
    ] {
        if let Some(old) = old.as_deref().filter(|old| Some(*old) != new.as_deref()) {
            release_quietly(images, actor_id, old);
        }
    }

    let token = if password_changed {
        let revoked = revoke_all_tokens(kv, actor_id)?;
        tracing::info!(user = actor_id, revoked, "password changed, sessions revoked");
        Some(issue_token(kv, actor_id)?)
    } else {
        None
    };
    tracing::info!(user = actor_id, "updated profile");

    Ok(UpdateOutcome {
        user: PublicUser::from(updated),
        token,
    })
}

// === HTTP Handlers ===

pub async fn get_profile(
    state: web::Data<AppState>,
    _auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(get_profile_by_username(state.kv(), &path)?))
}

pub async fn suggested(state: web::Data<AppState>, auth: AuthUser) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(suggested_for(state.kv(), &auth.user_id)?))
}

pub async fn follow(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let outcome = interactions::follow_unfollow(state.kv(), &auth.user_id, &path)?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub async fn update(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<UpdateInput>,
) -> ApiResult<HttpResponse> {
    let outcome = update_user(state.kv(), &*state.images, &auth.user_id, &body)?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::validate_token;
    use crate::core::db::MemoryStore;
    use crate::core::images::KvImageStore;
    use crate::models::models::NewUser;
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryStore>, KvImageStore) {
        let kv = Arc::new(MemoryStore::new());
        let images = KvImageStore::new(kv.clone());
        (kv, images)
    }

    fn user(kv: &MemoryStore, username: &str, password: &str) -> String {
        UserStore::new(kv)
            .insert(NewUser {
                username: username.to_string(),
                full_name: format!("{username} full"),
                email: format!("{username}@example.com"),
                password_hash: hash_password(password).unwrap(),
            })
            .unwrap()
            .unwrap()
            .id
    }

    #[test]
    fn suggested_excludes_self_and_followed() {
        let (kv, _) = setup();
        let alice = user(&kv, "alice", "secret1");
        let bob = user(&kv, "bob", "secret1");
        for name in ["carol", "dave", "erin", "frank", "grace"] {
            user(&kv, name, "secret1");
        }
        interactions::follow_unfollow(&*kv, &alice, &bob).unwrap();

        let picked = suggested_for(&*kv, &alice).unwrap();
        assert_eq!(picked.len(), SUGGESTED_USERS_LIMIT);
        assert!(picked.iter().all(|u| u.id != alice && u.id != bob));
    }

    #[test]
    fn password_change_needs_both_fields_and_correct_current() {
        let (kv, images) = setup();
        let alice = user(&kv, "alice", "secret1");

        let only_new = UpdateInput { new_password: Some("another1".into()), ..Default::default() };
        assert!(matches!(update_user(&*kv, &images, &alice, &only_new), Err(ApiError::Validation(_))));

        let wrong = UpdateInput {
            current_password: Some("nope".into()),
            new_password: Some("another1".into()),
            ..Default::default()
        };
        match update_user(&*kv, &images, &alice, &wrong) {
            Err(ApiError::Validation(msg)) => assert_eq!(msg, "Current password is incorrect"),
            other => panic!("unexpected: {other:?}"),
        }

        let short = UpdateInput {
            current_password: Some("secret1".into()),
            new_password: Some("abc".into()),
            ..Default::default()
        };
        assert!(matches!(update_user(&*kv, &images, &alice, &short), Err(ApiError::Validation(_))));
    }

    #[test]
    fn password_change_rotates_sessions() {
        let (kv, images) = setup();
        let alice = user(&kv, "alice", "secret1");
        let old_token = issue_token(&*kv, &alice).unwrap();

        let input = UpdateInput {
            current_password: Some("secret1".into()),
            new_password: Some("another1".into()),
            ..Default::default()
        };
        let outcome = update_user(&*kv, &images, &alice, &input).unwrap();
        let new_token = outcome.token.expect("new session token");

        assert_eq!(validate_token(&*kv, &old_token, 24).unwrap(), None);
        assert_eq!(validate_token(&*kv, &new_token, 24).unwrap(), Some(alice.clone()));
        let stored = UserStore::new(&*kv).get(&alice).unwrap().unwrap();
        assert!(verify_password("another1", &stored.password));
    }

    #[test]
    fn taken_email_rolls_back_username() {
        let (kv, images) = setup();
        let alice = user(&kv, "alice", "secret1");
        user(&kv, "bob", "secret1");

        let input = UpdateInput {
            username: Some("alicia".into()),
            email: Some("bob@example.com".into()),
            ..Default::default()
        };
        assert!(matches!(update_user(&*kv, &images, &alice, &input), Err(ApiError::Validation(_))));

        let users = UserStore::new(&*kv);
        assert_eq!(users.find_by_username("alice").unwrap().unwrap().id, alice);
        assert!(users.find_by_username("alicia").unwrap().is_none());
    }

    #[test]
    fn profile_fields_and_image_replacement() {
        let (kv, images) = setup();
        let alice = user(&kv, "alice", "secret1");

        let first = UpdateInput {
            full_name: Some("Alice Liddell".into()),
            bio: Some("<b>down</b> the rabbit hole".into()),
            link: Some("https://wonderland.example".into()),
            profile_img: Some("https://cdn.example.com/a.png".into()),
            ..Default::default()
        };
        let outcome = update_user(&*kv, &images, &alice, &first).unwrap();
        assert!(outcome.token.is_none());
        assert_eq!(outcome.user.full_name, "Alice Liddell");
        assert_eq!(outcome.user.bio.as_deref(), Some("down the rabbit hole"));
        let old_ref = outcome.user.profile_img.clone().unwrap();
        assert!(old_ref.starts_with("/images/"));

        let second = UpdateInput {
            profile_img: Some("https://cdn.example.com/b.png".into()),
            ..Default::default()
        };
        let outcome = update_user(&*kv, &images, &alice, &second).unwrap();
        assert_ne!(outcome.user.profile_img.as_deref(), Some(old_ref.as_str()));
        // the replaced image is gone
        let old_id = old_ref.trim_start_matches("/images/");
        assert!(images.fetch(old_id).unwrap().is_none());
        // untouched fields survive
        assert_eq!(outcome.user.full_name, "Alice Liddell");

        let bad_image = UpdateInput {
            profile_img: Some("data:image/png;base64,abcde".into()),
            ..Default::default()
        };
        assert!(matches!(update_user(&*kv, &images, &alice, &bad_image), Err(ApiError::Validation(_))));

        let bad_link = UpdateInput { link: Some("wonderland".into()), ..Default::default() };
        assert!(matches!(update_user(&*kv, &images, &alice, &bad_link), Err(ApiError::Validation(_))));
    }

    #[test]
    fn profile_lookup_hides_password() {
        let (kv, _) = setup();
        user(&kv, "alice", "secret1");
        let profile = get_profile_by_username(&*kv, "alice").unwrap();
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("password").is_none());
        assert!(matches!(get_profile_by_username(&*kv, "nobody"), Err(ApiError::NotFound(_))));
    }
}
