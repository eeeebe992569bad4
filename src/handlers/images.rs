use super::{JsonBody, QueryParams};
use crate::{
    auth::AdminAccess,
    domain::FileStorage,
    errors::{AppError, StorageError},
    gallery::{self, GalleryQuery},
    models::ImageDetails,
    voting::VoteKind,
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub async fn list_images(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<GalleryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let images = state.images.list_all().await?;
    let page = query.apply(images);
    tracing::debug!(total = page.total, returned = page.images.len(), "Gallery page built");
    Ok(Json(page))
}

pub async fn weekly_images(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let images = state.images.list_all().await?;
    let now = Utc::now();
    let selection = gallery::weekly_selection(images, now, state.config.weekly_selection_size);
    tracing::debug!(week = %gallery::week_key(now), count = selection.len(), "Weekly selection built");
    Ok(Json(selection))
}

pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let image_id = Uuid::parse_str(&id_str)?;
    match state.images.get_by_id(image_id).await? {
        Some(image) => Ok(Json(image)),
        None => Err(AppError::NotFound(format!("Image {}", image_id))),
    }
}

pub async fn update_image(
    _admin: AdminAccess,
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    JsonBody(details): JsonBody<ImageDetails>,
) -> Result<impl IntoResponse, AppError> {
    let image_id = Uuid::parse_str(&id_str)?;
    if details.is_empty() {
        return Err(AppError::InvalidInput("Nothing to update: expected title, genre or game".to_string()));
    }
    let fields = [&details.title, &details.genre, &details.game];
    if fields.iter().any(|f| f.as_deref().is_some_and(|v| v.trim().is_empty())) {
        return Err(AppError::InvalidInput("title, genre and game must not be blank".to_string()));
    }

    let image = state.images.update_details(image_id, &details).await?;
    tracing::info!(%image_id, "Image details updated");
    Ok(Json(image))
}

#[derive(Deserialize, Debug)]
pub struct VoteBody {
    pub user_id: String,
    pub vote: VoteKind,
}

/// POST /api/images/{id}/vote: toggles the caller's like or dislike.
pub async fn vote(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    JsonBody(body): JsonBody<VoteBody>,
) -> Result<impl IntoResponse, AppError> {
    let image_id = Uuid::parse_str(&id_str)?;
    let user_id = body.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::InvalidInput("user_id must not be empty".to_string()));
    }

    let image = state.images.apply_vote(image_id, user_id, body.vote).await?;
    tracing::info!(%image_id, %user_id, vote = ?body.vote, likes = image.likes, dislikes = image.dislikes, "Vote applied");
    Ok(Json(image))
}

#[derive(Deserialize, Debug, Default)]
pub struct DeleteImageBody {
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub public_id: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// The same key with the store's folder prefix toggled: stripped when
/// present, added when absent.
pub(crate) fn alternate_key(key: &str, prefix: Option<&str>) -> Option<String> {
    let prefix = prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty())?;
    let folder = format!("{}/", prefix);
    match key.strip_prefix(&folder) {
        Some(rest) if !rest.is_empty() => Some(rest.to_string()),
        Some(_) => None,
        None => Some(format!("{}{}", folder, key.trim_start_matches('/'))),
    }
}

async fn delete_blob(storage: &dyn FileStorage, key: &str) -> Result<(), StorageError> {
    match storage.delete(key).await {
        Err(StorageError::NotFound(_)) => {
            let Some(alternate) = alternate_key(key, storage.folder_prefix()) else {
                return Err(StorageError::NotFound(key.to_string()));
            };
            tracing::warn!(key = %key, alternate = %alternate, "Blob not found, retrying with folder prefix toggled");
            storage.delete(&alternate).await
        }
        other => other,
    }
}

/// POST /api/delete: removes the blob, then the image document. The document
/// is kept whenever the blob could not be removed.
pub async fn delete_image(
    _admin: AdminAccess,
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<DeleteImageBody>,
) -> Result<impl IntoResponse, AppError> {
    let doc_id = present(body.doc_id).ok_or_else(|| AppError::InvalidInput("doc_id is required".to_string()))?;
    let image_id = Uuid::parse_str(&doc_id)?;

    let (storage, key) = match (present(body.path), present(body.public_id)) {
        (Some(path), _) => (
            state
                .repository_storage
                .clone()
                .ok_or_else(|| AppError::ProviderUnavailable("Repository storage".to_string()))?,
            path,
        ),
        (None, Some(public_id)) => (state.hosted_storage.clone(), public_id),
        (None, None) => {
            return Err(AppError::InvalidInput(
                "Either path or public_id is required to delete the stored file".to_string(),
            ));
        }
    };

    delete_blob(storage.as_ref(), &key).await.map_err(|e| {
        tracing::error!(%image_id, key = %key, error = ?e, "Failed to delete stored file, keeping image document");
        AppError::from(e)
    })?;

    state.images.delete(image_id).await?;
    tracing::info!(%image_id, key = %key, "Image deleted");
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternate_key_toggles_the_folder() {
        assert_eq!(
            alternate_key("abc.jpg", Some("screenshots")).as_deref(),
            Some("screenshots/abc.jpg")
        );
        assert_eq!(
            alternate_key("screenshots/abc.jpg", Some("screenshots")).as_deref(),
            Some("abc.jpg")
        );
        assert_eq!(
            alternate_key("abc.jpg", Some("/uploads/")).as_deref(),
            Some("uploads/abc.jpg")
        );
    }

    #[test]
    fn no_alternate_without_a_prefix() {
        assert_eq!(alternate_key("abc.jpg", None), None);
        assert_eq!(alternate_key("abc.jpg", Some("")), None);
        assert_eq!(alternate_key("screenshots/", Some("screenshots")), None);
    }

    #[test]
    fn delete_body_fields_are_optional() {
        let body: DeleteImageBody = serde_json::from_str(r#"{"doc_id":"x"}"#).unwrap();
        assert_eq!(body.doc_id.as_deref(), Some("x"));
        assert!(body.path.is_none() && body.public_id.is_none());
        assert_eq!(present(Some("   ".into())), None);
    }
}
