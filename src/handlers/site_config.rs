use super::JsonBody;
use crate::{auth::AdminAccess, errors::AppError, site_config::ConfigChange, AppState};
use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

/// Always read from the store; dropdowns must see the latest lists.
pub async fn get_config(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.site_config.get().await?))
}

pub async fn update_config(
    _admin: AdminAccess,
    State(state): State<Arc<AppState>>,
    JsonBody(change): JsonBody<ConfigChange>,
) -> Result<impl IntoResponse, AppError> {
    let config = state.site_config.apply(&change).await?;
    tracing::info!(?change, version = config.version, "Site config change applied");
    Ok(Json(config))
}
