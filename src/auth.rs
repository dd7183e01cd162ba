use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::config::{token_key, tokens_key};
use crate::core::db::{Store, StoreExt};
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{hash_password, now, validate_uuid, verify_password};
use crate::core::validation::{validate_signup, SignupInput};
use crate::models::models::{NewUser, PublicUser, TokenData};
use crate::stores::UserStore;
use crate::AppState;

/// The caller, resolved from an `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub token: String,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn authenticate(req: &HttpRequest) -> ApiResult<AuthUser> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| anyhow::anyhow!("application state is not registered"))?;
    let token = bearer_token(req).ok_or(ApiError::Unauthorized)?;
    let user_id = validate_token(state.kv(), token, state.config.token_expiration_hours)?
        .ok_or(ApiError::Unauthorized)?;

    Ok(AuthUser {
        user_id,
        token: token.to_string(),
    })
}

/// Resolves a session token to its user id. Expired tokens are removed on sight;
/// tokens of deleted users are rejected.
pub fn validate_token(kv: &dyn Store, token: &str, expiration_hours: i64) -> anyhow::Result<Option<String>> {
    if !validate_uuid(token) {
        return Ok(None);
    }
    let Some(data) = kv.get_json::<TokenData>(&token_key(token))? else {
        return Ok(None);
    };

    let age_hours = (now() - data.created_at).num_hours();
    if age_hours >= expiration_hours {
        revoke_token(kv, &data.user_id, token)?;
        return Ok(None);
    }

    if UserStore::new(kv).get(&data.user_id)?.is_none() {
        return Ok(None);
    }
    Ok(Some(data.user_id))
}

pub fn issue_token(kv: &dyn Store, user_id: &str) -> anyhow::Result<String> {
    let token = Uuid::new_v4().to_string();
    let data = TokenData {
        user_id: user_id.to_string(),
        created_at: now(),
    };
    kv.set_json(&token_key(&token), &data)?;
    kv.upsert_json::<Vec<String>, _>(&tokens_key(user_id), |tokens| tokens.push(token.clone()))?;
    Ok(token)
}

pub fn revoke_token(kv: &dyn Store, user_id: &str, token: &str) -> anyhow::Result<()> {
    kv.delete(&token_key(token))?;
    kv.upsert_json::<Vec<String>, _>(&tokens_key(user_id), |tokens| tokens.retain(|t| t != token))?;
    Ok(())
}

/// Drops every session of the user. Returns how many were revoked.
pub fn revoke_all_tokens(kv: &dyn Store, user_id: &str) -> anyhow::Result<usize> {
    let index = tokens_key(user_id);
    let tokens: Vec<String> = kv.get_json(&index)?.unwrap_or_default();
    for token in &tokens {
        kv.delete(&token_key(token))?;
    }
    kv.upsert_json::<Vec<String>, _>(&index, |current| current.retain(|t| !tokens.contains(t)))?;
    Ok(tokens.len())
}

#[derive(Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

// === HTTP Handlers ===

pub async fn signup(state: web::Data<AppState>, body: web::Json<SignupInput>) -> ApiResult<HttpResponse> {
    let valid = validate_signup(&body).map_err(ApiError::Validation)?;
    let kv = state.kv();
    let users = UserStore::new(kv);

    if users.find_by_username(&valid.username)?.is_some() {
        return Err(ApiError::validation("Username is already taken"));
    }
    if users.find_by_email(&valid.email)?.is_some() {
        return Err(ApiError::validation("Email is already taken"));
    }

    let user = users
        .insert(NewUser {
            username: valid.username,
            full_name: valid.full_name,
            email: valid.email,
            password_hash: hash_password(&valid.password)?,
        })?
        // lost a race for the username or email
        .ok_or_else(|| ApiError::validation("Username or email is already taken"))?;

    let token = issue_token(kv, &user.id)?;
    tracing::info!(user = %user.id, username = %user.username, "signed up");

    Ok(HttpResponse::Created().json(serde_json::json!({
        "token": token,
        "user": PublicUser::from(user),
    })))
}

pub async fn login(state: web::Data<AppState>, body: web::Json<LoginInput>) -> ApiResult<HttpResponse> {
    let kv = state.kv();
    let user = UserStore::new(kv)
        .find_by_username(body.username.trim())?
        .filter(|u| verify_password(&body.password, &u.password))
        .ok_or(ApiError::Unauthorized)?;

    let token = issue_token(kv, &user.id)?;
    tracing::info!(user = %user.id, "logged in");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "token": token,
        "user": PublicUser::from(user),
    })))
}

pub async fn logout(state: web::Data<AppState>, auth: AuthUser) -> ApiResult<HttpResponse> {
    revoke_token(state.kv(), &auth.user_id, &auth.token)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Logged out successfully"
    })))
}

pub async fn me(state: web::Data<AppState>, auth: AuthUser) -> ApiResult<HttpResponse> {
    let user = UserStore::new(state.kv())
        .get(&auth.user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(HttpResponse::Ok().json(PublicUser::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::MemoryStore;

    fn user(kv: &MemoryStore) -> String {
        UserStore::new(kv)
            .insert(NewUser {
                username: "alice".into(),
                full_name: "Alice".into(),
                email: "alice@example.com".into(),
                password_hash: "x".into(),
            })
            .unwrap()
            .unwrap()
            .id
    }

    #[test]
    fn issued_tokens_validate_until_revoked() {
        let kv = MemoryStore::new();
        let alice = user(&kv);
        let token = issue_token(&kv, &alice).unwrap();

        assert_eq!(validate_token(&kv, &token, 24).unwrap(), Some(alice.clone()));
        revoke_token(&kv, &alice, &token).unwrap();
        assert_eq!(validate_token(&kv, &token, 24).unwrap(), None);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let kv = MemoryStore::new();
        let alice = user(&kv);
        let token = issue_token(&kv, &alice).unwrap();
        assert_eq!(validate_token(&kv, &token, 0).unwrap(), None);
        // and purged
        assert!(kv.get(&token_key(&token)).unwrap().is_none());
    }

    #[test]
    fn revoke_all_drops_every_session() {
        let kv = MemoryStore::new();
        let alice = user(&kv);
        let a = issue_token(&kv, &alice).unwrap();
        let b = issue_token(&kv, &alice).unwrap();

        assert_eq!(revoke_all_tokens(&kv, &alice).unwrap(), 2);
        assert_eq!(validate_token(&kv, &a, 24).unwrap(), None);
        assert_eq!(validate_token(&kv, &b, 24).unwrap(), None);
    }
}
