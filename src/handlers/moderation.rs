use super::QueryParams;
use crate::{
    auth::AdminAccess,
    errors::AppError,
    models::RequestStatus,
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Deserialize, Debug, Default)]
pub struct RequestListQuery {
    pub status: Option<String>,
}

/// GET /api/requests: newest first, optionally filtered by status.
pub async fn list_requests(
    _admin: AdminAccess,
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<RequestListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            RequestStatus::parse(&raw.to_lowercase())
                .ok_or_else(|| AppError::InvalidInput(format!("Unknown request status '{}'", raw)))?,
        ),
        None => None,
    };

    let mut requests = state.requests.list_all().await?;
    if let Some(status) = status {
        requests.retain(|r| r.status == status);
    }
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    tracing::debug!(count = requests.len(), ?status, "Listed upload requests");
    Ok(Json(requests))
}

/// POST /api/requests/{id}/approve: promotes the request into a gallery image.
pub async fn approve_request(
    _admin: AdminAccess,
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = Uuid::parse_str(&id_str)?;
    let image = state.requests.promote(request_id, Uuid::new_v4(), Utc::now()).await?;
    tracing::info!(%request_id, image_id = %image.image_id, "Upload request approved");
    Ok(Json(image))
}

pub async fn reject_request(
    _admin: AdminAccess,
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = Uuid::parse_str(&id_str)?;
    let request = state.requests.set_status(request_id, RequestStatus::Rejected).await?;
    tracing::info!(%request_id, "Upload request rejected");
    Ok(Json(request))
}
