use actix_web::http::header::{CONTENT_TYPE, LOCATION};
use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::images::ImageBody;
use crate::core::validation::PostInput;
use crate::{feed, interactions, AppState};

#[derive(Deserialize)]
pub struct CommentInput {
    #[serde(default)]
    text: String,
}

pub async fn list_all(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(feed::list_all(state.kv())?))
}

pub async fn get_post(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(feed::get_post(state.kv(), &path)?))
}

pub async fn list_following(state: web::Data<AppState>, auth: AuthUser) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(feed::list_following(state.kv(), &auth.user_id)?))
}

pub async fn list_liked(
    state: web::Data<AppState>,
    _auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(feed::list_liked(state.kv(), &path)?))
}

pub async fn list_by_username(
    state: web::Data<AppState>,
    _auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(feed::list_by_author_username(state.kv(), &path)?))
}

pub async fn list_bookmarked(state: web::Data<AppState>, auth: AuthUser) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(feed::list_bookmarked(state.kv(), &auth.user_id)?))
}

pub async fn create_post(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<PostInput>,
) -> ApiResult<HttpResponse> {
    let post = interactions::create_post(state.kv(), &*state.images, &auth.user_id, &body)?;
    Ok(HttpResponse::Created().json(post))
}

pub async fn delete_post(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    interactions::delete_post(state.kv(), &*state.images, &auth.user_id, &path)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Post deleted successfully"
    })))
}

pub async fn comment(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    body: web::Json<CommentInput>,
) -> ApiResult<HttpResponse> {
    let kv = state.kv();
    let post = interactions::comment_on_post(kv, &auth.user_id, &path, &body.text)?;
    Ok(HttpResponse::Ok().json(feed::view_of(kv, post)?))
}

/// Responds with the post's `likes` after the toggle.
pub async fn like(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let likes = interactions::like_unlike(state.kv(), &auth.user_id, &path)?;
    Ok(HttpResponse::Ok().json(likes))
}

pub async fn bookmark(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let bookmarks = interactions::bookmark_unbookmark(state.kv(), &auth.user_id, &path)?;
    Ok(HttpResponse::Ok().json(bookmarks))
}

pub async fn delete_all_bookmarks(state: web::Data<AppState>, auth: AuthUser) -> ApiResult<HttpResponse> {
    let removed = interactions::delete_all_bookmarks(state.kv(), &auth.user_id)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Bookmarks deleted successfully",
        "removed": removed,
    })))
}

pub async fn serve_image(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    match state.images.fetch(&path)? {
        Some(ImageBody::Inline { content_type, bytes }) => Ok(HttpResponse::Ok()
            .insert_header((CONTENT_TYPE, content_type))
            .body(bytes)),
        Some(ImageBody::Remote(url)) => Ok(HttpResponse::Found()
            .insert_header((LOCATION, url))
            .finish()),
        None => Err(ApiError::not_found("Image not found")),
    }
}
