use crate::{
    handlers::{self, assets, images, moderation, site_config, uploads, users},
    AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Room for multipart framing and text fields around the largest allowed file.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(handlers::health))
        // Uploads
        .route("/api/upload", post(uploads::upload))
        .route("/api/admin-upload", post(uploads::admin_upload))
        .route("/api/github-upload", post(uploads::github_upload).get(uploads::github_usage))
        .route("/api/logo-upload", post(uploads::logo_upload))
        .route("/api/profile-photo", post(uploads::profile_photo))
        .route("/api/delete", post(images::delete_image))
        // Moderation
        .route("/api/requests", get(moderation::list_requests))
        .route("/api/requests/{id}/approve", post(moderation::approve_request))
        .route("/api/requests/{id}/reject", post(moderation::reject_request))
        // Gallery
        .route("/api/images", get(images::list_images))
        .route("/api/images/weekly", get(images::weekly_images))
        .route("/api/images/{id}", get(images::get_image).patch(images::update_image))
        .route("/api/images/{id}/vote", post(images::vote))
        .route("/api/config", get(site_config::get_config).post(site_config::update_config))
        // Profiles
        .route("/api/users", post(users::create_user))
        .route("/api/users/{id}", get(users::get_user).patch(users::update_user))
        .route("/assets/{*key}", get(assets::get_asset))
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
