use super::JsonBody;
use crate::{
    auth,
    errors::AppError,
    models::{NewUser, ProfileUpdate, UserProfile},
    profiles::{check_edit_cooldown, EditDecision},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

fn non_blank(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

/// Refuses a profile edit during the cooldown unless the caller holds the
/// admin token or the profile belongs to an admin account. Returns whether
/// the edit was exempt.
pub(crate) fn ensure_edit_allowed(
    state: &AppState,
    headers: &HeaderMap,
    profile: &UserProfile,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let exempt = auth::is_admin(headers, &state.config) || state.config.is_admin_email(&profile.email);
    let cooldown = Duration::try_days(state.config.profile_edit_cooldown_days).ok_or_else(|| {
        AppError::ConfigError(format!(
            "profile edit cooldown of {} days is out of range",
            state.config.profile_edit_cooldown_days
        ))
    })?;
    if let EditDecision::CoolingDown { next_allowed } =
        check_edit_cooldown(profile.last_profile_edit, now, cooldown, exempt)
    {
        tracing::warn!(user_id = %profile.user_id, %next_allowed, "Profile edit refused during cooldown");
        return Err(AppError::CooldownActive { next_allowed });
    }
    Ok(exempt)
}

/// POST /api/users: records a profile at signup.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    JsonBody(new_user): JsonBody<NewUser>,
) -> Result<impl IntoResponse, AppError> {
    let profile = UserProfile {
        user_id: non_blank("user_id", &new_user.user_id)?,
        username: non_blank("username", &new_user.username)?,
        email: non_blank("email", &new_user.email)?,
        photo_url: None,
        created_at: Utc::now(),
        last_profile_edit: None,
    };
    state.users.create(&profile).await?;

    tracing::info!(user_id = %profile.user_id, "User profile created");
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    match state.users.get_by_id(&user_id).await? {
        Some(profile) => Ok(Json(profile)),
        None => Err(AppError::NotFound(format!("User {}", user_id))),
    }
}

/// PATCH /api/users/{id}: edits username and photo, at most once per
/// cooldown period unless the caller or the account is admin.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    JsonBody(update): JsonBody<ProfileUpdate>,
) -> Result<impl IntoResponse, AppError> {
    if update.username.is_none() && update.photo_url.is_none() {
        return Err(AppError::InvalidInput("Nothing to update: expected username or photo_url".to_string()));
    }

    let mut profile = state
        .users
        .get_by_id(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

    let now = Utc::now();
    let exempt = ensure_edit_allowed(&state, &headers, &profile, now)?;

    if let Some(username) = &update.username {
        profile.username = non_blank("username", username)?;
    }
    if let Some(photo_url) = &update.photo_url {
        profile.photo_url = Some(non_blank("photo_url", photo_url)?);
    }
    profile.last_profile_edit = Some(now);
    state.users.update(&profile).await?;

    tracing::info!(%user_id, admin_bypass = exempt, "User profile updated");
    Ok(Json(profile))
}
