use crate::{config::Config, errors::AppError, AppState};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use std::sync::Arc;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Extractor that only succeeds for callers presenting the admin token.
/// Put it before any body extractor in a handler's argument list.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

impl FromRequestParts<Arc<AppState>> for AdminAccess {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        if is_admin(&parts.headers, &state.config) {
            Ok(AdminAccess)
        } else {
            tracing::warn!(path = %parts.uri.path(), "Rejected admin request without valid token");
            Err(AppError::Unauthorized)
        }
    }
}

/// Without a configured `ADMIN_TOKEN` nobody is admin.
pub fn is_admin(headers: &HeaderMap, config: &Config) -> bool {
    let Some(expected) = config.admin_token.as_deref().filter(|t| !t.is_empty()) else {
        return false;
    };
    headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|given| given == expected)
}
