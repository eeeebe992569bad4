use super::{object_key, users::ensure_edit_allowed, FilePart, UploadForm};
use crate::{
    auth::AdminAccess,
    domain::FileStorage,
    errors::{AppError, StorageError},
    media,
    models::{Image, StoredFile, Submission, UploadRequest},
    site_config::ConfigChange,
    storage::SCREENSHOT_FOLDER,
    AppState,
};
use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const LOGO_FOLDER: &str = "logos";
const PROFILE_PHOTO_FOLDER: &str = "profile-photos";
const JPEG: &str = "image/jpeg";

/// Text fields every screenshot upload carries.
struct ScreenshotFields {
    title: String,
    genre: String,
    game: String,
    uploader_id: String,
    uploader_email: String,
}

impl ScreenshotFields {
    fn from_form(form: &UploadForm) -> Result<Self, AppError> {
        Ok(Self {
            title: form.required("name")?,
            genre: form.required("genre")?,
            game: form.required("game")?,
            uploader_id: form.required("userId")?,
            uploader_email: form.required("userEmail")?,
        })
    }

    fn into_submission(self, url: String, storage_path: Option<String>, public_id: Option<String>) -> Submission {
        Submission {
            title: self.title,
            url,
            genre: self.genre,
            game: self.game,
            uploader_id: self.uploader_id,
            uploader_email: Some(self.uploader_email),
            storage_path,
            public_id,
        }
    }
}

/// Checks the part is an image within `max` bytes and returns its MIME type.
fn screenshot_type(file: &FilePart, max: usize) -> Result<String, AppError> {
    let content_type = media::resolve_content_type(file.content_type.as_deref(), file.file_name.as_deref(), &file.data);
    media::ensure_image(content_type.as_deref(), file.data.len(), max)?;
    content_type.ok_or_else(|| AppError::InvalidInput("Could not determine file type".to_string()))
}

async fn store_in(
    storage: &dyn FileStorage,
    folder: Option<&str>,
    file: FilePart,
    content_type: String,
) -> Result<StoredFile, AppError> {
    let extension = media::extension_for(Some(&content_type), file.file_name.as_deref());
    let key = object_key(folder, &format!("{}.{}", Uuid::new_v4(), extension));
    Ok(storage.upload(&key, file.data, Some(content_type)).await?)
}

async fn read_screenshot(state: &AppState, multipart: Multipart) -> Result<(ScreenshotFields, FilePart, String), AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let fields = ScreenshotFields::from_form(&form)?;
    let file = form.take_image()?;
    let content_type = screenshot_type(&file, state.config.max_upload_bytes)?;
    Ok((fields, file, content_type))
}

/// POST /api/upload: stores the screenshot in the hosted store and files a
/// pending request for moderation.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let (fields, file, content_type) = read_screenshot(&state, multipart).await?;

    let stored = store_in(state.hosted_storage.as_ref(), Some(SCREENSHOT_FOLDER), file, content_type).await?;
    tracing::debug!(s3_key = %stored.key, "Screenshot stored, recording upload request");

    let request = UploadRequest::pending(fields.into_submission(stored.url, None, Some(stored.key)), Utc::now());
    state.requests.create(&request).await?;

    tracing::info!(request_id = %request.request_id, uploader = %request.submission.uploader_id, "Upload request created");
    Ok((StatusCode::CREATED, Json(request)))
}

/// POST /api/admin-upload: same form, published straight to the gallery.
pub async fn admin_upload(
    _admin: AdminAccess,
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let (fields, file, content_type) = read_screenshot(&state, multipart).await?;

    let stored = store_in(state.hosted_storage.as_ref(), Some(SCREENSHOT_FOLDER), file, content_type).await?;
    let image = Image::from_submission(
        Uuid::new_v4(),
        fields.into_submission(stored.url, None, Some(stored.key)),
        Utc::now(),
    );
    state.images.create(&image).await?;

    tracing::info!(image_id = %image.image_id, "Image published by admin upload");
    Ok((StatusCode::CREATED, Json(image)))
}

fn repository_storage(state: &AppState) -> Result<&Arc<dyn FileStorage>, AppError> {
    state
        .repository_storage
        .as_ref()
        .ok_or_else(|| AppError::ProviderUnavailable("Repository storage".to_string()))
}

/// POST /api/github-upload: re-encodes the screenshot, checks the repository
/// quota, commits it and files a pending request.
pub async fn github_upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let storage = repository_storage(&state)?.clone();
    let (fields, file, _) = read_screenshot(&state, multipart).await?;

    let settings = state.config.recompress;
    let original_size = file.data.len();
    let raw = file.data;
    let data =
        tokio::task::spawn_blocking(move || media::recompress(&raw, settings.max_width, settings.quality)).await??;
    tracing::debug!(original_size, recompressed_size = data.len(), "Screenshot re-encoded for repository storage");

    if let Some(usage) = storage.usage().await? {
        let needed = data.len() as u64;
        if needed > usage.remaining_bytes {
            tracing::warn!(needed, remaining = usage.remaining_bytes, "Repository storage quota exceeded");
            return Err(StorageError::QuotaExceeded { needed, remaining: usage.remaining_bytes }.into());
        }
    }

    let key = object_key(storage.folder_prefix(), &format!("{}.jpg", Uuid::new_v4()));
    let stored = storage.upload(&key, data, Some(JPEG.to_string())).await?;

    let request = UploadRequest::pending(fields.into_submission(stored.url, Some(stored.key), None), Utc::now());
    state.requests.create(&request).await?;

    tracing::info!(request_id = %request.request_id, storage_path = ?request.submission.storage_path, "Repository upload request created");
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/github-upload
pub async fn github_usage(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let usage = repository_storage(&state)?
        .usage()
        .await?
        .ok_or_else(|| AppError::ProviderUnavailable("Repository storage usage".to_string()))?;
    Ok(Json(usage))
}

/// POST /api/logo-upload: stores a game logo; with `game` it is also set as
/// that game's logo.
pub async fn logo_upload(
    _admin: AdminAccess,
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let game = form.optional("game");
    let file = form.take_image()?;
    let content_type = screenshot_type(&file, state.config.max_upload_bytes)?;

    // Refuse before uploading so unknown games leave no orphaned blob.
    if let Some(game) = &game {
        if !state.site_config.get().await?.games.contains(game) {
            return Err(AppError::NotFound(format!("Game '{}'", game)));
        }
    }

    let stored = store_in(state.hosted_storage.as_ref(), Some(LOGO_FOLDER), file, content_type).await?;
    if let Some(game) = game {
        state
            .site_config
            .apply(&ConfigChange::SetLogo { game: game.clone(), url: stored.url.clone() })
            .await?;
        tracing::info!(%game, url = %stored.url, "Game logo updated");
    }

    Ok(Json(json!({ "url": stored.url })))
}

/// POST /api/profile-photo: when the user has a profile, linking the photo
/// counts as a profile edit and is subject to the same cooldown.
pub async fn profile_photo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let user_id = form.required("userId")?;
    let file = form.take_image()?;

    let now = Utc::now();
    let profile = state.users.get_by_id(&user_id).await?;
    if let Some(profile) = &profile {
        ensure_edit_allowed(&state, &headers, profile, now)?;
    }

    let content_type = media::resolve_content_type(file.content_type.as_deref(), file.file_name.as_deref(), &file.data);
    media::ensure_image(content_type.as_deref(), file.data.len(), media::PROFILE_PHOTO_MAX_BYTES)?;

    let raw = file.data;
    let avatar = tokio::task::spawn_blocking(move || {
        media::square_avatar(&raw, media::PROFILE_PHOTO_SIDE, media::PROFILE_PHOTO_QUALITY)
    })
    .await??;

    let key = object_key(Some(PROFILE_PHOTO_FOLDER), &format!("{}.jpg", Uuid::new_v4()));
    let stored = state.hosted_storage.upload(&key, avatar, Some(JPEG.to_string())).await?;

    if let Some(mut profile) = profile {
        profile.photo_url = Some(stored.url.clone());
        profile.last_profile_edit = Some(now);
        state.users.update(&profile).await?;
        tracing::info!(%user_id, url = %stored.url, "Profile photo updated");
    } else {
        tracing::debug!(%user_id, "Profile photo stored for user without a profile");
    }

    Ok(Json(json!({ "url": stored.url })))
}
