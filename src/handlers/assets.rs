use crate::{
    errors::{AppError, StorageError},
    AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use std::sync::Arc;

/// GET /assets/{*key}: serves an object from the hosted store.
pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    tracing::debug!(s3_key = %key, "Serving asset");

    let (data, content_type) = state.hosted_storage.download(&key).await.map_err(|e| match e {
        StorageError::NotFound(key) => AppError::NotFound(format!("Asset '{}'", key)),
        other => other.into(),
    })?;

    let content_type = content_type
        .or_else(|| mime_guess::from_path(&key).first_raw().map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .header(header::CONTENT_SECURITY_POLICY, "sandbox")
        .body(Body::from(data))
        .map_err(|e| AppError::InternalServerError(format!("Failed to build asset response: {}", e)))
}
