//! Social feed backend: users post, follow each other, like, bookmark and comment on
//! posts, and get notified about follows, likes and bookmarks.
//!
//! State lives in a key-value document [`Store`](crate::core::db::Store). Handlers are
//! request-scoped and share nothing besides [`AppState`].

pub mod auth;
pub mod config;
pub mod core;
pub mod feed;
pub mod interactions;
pub mod models;
pub mod notifications;
pub mod posts;
pub mod stores;
pub mod users;

use std::sync::Arc;

use actix_web::web;

use crate::config::Config;
use crate::core::db::{MemoryStore, Store};
use crate::core::errors::ApiError;
use crate::core::images::KvImageStore;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub images: Arc<KvImageStore>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }

    pub fn with_store(store: Arc<dyn Store>, config: Config) -> Self {
        let images = Arc::new(KvImageStore::new(Arc::clone(&store)));
        Self {
            store,
            images,
            config,
        }
    }

    pub fn kv(&self) -> &dyn Store {
        self.store.as_ref()
    }
}

/// Registers every route. Specific `/posts/...` paths come before `/posts/{id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::validation(err.to_string()).into());

    cfg.app_data(json_config)
        .service(
            web::scope("/auth")
                .route("/signup", web::post().to(auth::signup))
                .route("/login", web::post().to(auth::login))
                .route("/logout", web::post().to(auth::logout))
                .route("/me", web::get().to(auth::me)),
        )
        .service(
            web::scope("/posts")
                .service(
                    web::resource("")
                        .route(web::get().to(posts::list_all))
                        .route(web::post().to(posts::create_post)),
                )
                .route("/following", web::get().to(posts::list_following))
                .route("/likes/{user_id}", web::get().to(posts::list_liked))
                .route("/user/{username}", web::get().to(posts::list_by_username))
                .service(
                    web::resource("/bookmarks")
                        .route(web::get().to(posts::list_bookmarked))
                        .route(web::delete().to(posts::delete_all_bookmarks)),
                )
                .route("/{id}/comment", web::post().to(posts::comment))
                .route("/{id}/like", web::post().to(posts::like))
                .route("/{id}/bookmark", web::post().to(posts::bookmark))
                .service(
                    web::resource("/{id}")
                        .route(web::get().to(posts::get_post))
                        .route(web::delete().to(posts::delete_post)),
                ),
        )
        .service(
            web::scope("/users")
                .route("/profile/{username}", web::get().to(users::get_profile))
                .route("/suggested", web::get().to(users::suggested))
                .route("/follow/{id}", web::post().to(users::follow))
                .route("/update", web::post().to(users::update)),
        )
        .service(
            web::resource("/notifications")
                .route(web::get().to(notifications::get_notifications))
                .route(web::delete().to(notifications::delete_notifications)),
        )
        .route("/images/{id}", web::get().to(posts::serve_image));
}
