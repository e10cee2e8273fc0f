// --------------------------------------------------
// Handles per-app limits and the user's quiet hours.
//
// Responsibilities:
// - List / read / upsert / delete app threshold configs
// - Get / replace quiet hours
// -------------------------------------------------

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{AppThresholdConfig, NotificationLevel, QuietHoursConfig};
use crate::state::{AppState, now_fixed_offset};

#[derive(Debug, Deserialize)]
pub struct AppConfigInput {
    pub threshold_minutes: i64,
    pub notification_level: Option<NotificationLevel>,
    pub custom_messages: Option<Vec<String>>,
}

impl AppConfigInput {
    // Trim the app id, drop blank messages, default the level
    pub fn normalize(self, app_id: &str) -> AppThresholdConfig {
        let custom_messages = self
            .custom_messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        AppThresholdConfig {
            app_id: app_id.trim().to_string(),
            threshold_minutes: self.threshold_minutes,
            notification_level: self.notification_level.unwrap_or_default(),
            custom_messages,
        }
    }

    // Write-time validation before anything reaches the store
    pub fn into_config(self, app_id: &str) -> Result<AppThresholdConfig, ApiError> {
        if app_id.trim().is_empty() {
            return Err(ApiError::BadRequest("app_id required".to_string()));
        }
        if self.threshold_minutes <= 0 {
            return Err(ApiError::BadRequest(
                "threshold_minutes must be positive".to_string(),
            ));
        }
        Ok(self.normalize(app_id))
    }
}

// -----------------------------
// GET /api/users/:user_id/apps
// -----------------------------
pub async fn list_apps(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<AppThresholdConfig>>, ApiError> {
    state.require_user(user_id)?;
    Ok(Json(state.repo.list_app_configs(user_id)?))
}

// -----------------------------
// GET /api/users/:user_id/apps/:app_id
// -----------------------------
pub async fn get_app(
    State(state): State<AppState>,
    Path((user_id, app_id)): Path<(Uuid, String)>,
) -> Result<Json<AppThresholdConfig>, ApiError> {
    state.require_user(user_id)?;
    state
        .repo
        .get_app_config(user_id, &app_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("app not configured".to_string()))
}

// -----------------------------
// PUT /api/users/:user_id/apps/:app_id
// Creates or replaces the config
// -----------------------------
pub async fn put_app(
    State(state): State<AppState>,
    Path((user_id, app_id)): Path<(Uuid, String)>,
    Json(input): Json<AppConfigInput>,
) -> Result<Json<AppThresholdConfig>, ApiError> {
    state.require_user(user_id)?;
    let config = input.into_config(&app_id)?;
    state
        .repo
        .upsert_app_config(user_id, config.clone(), now_fixed_offset())?;
    tracing::info!(%user_id, app_id = %config.app_id, threshold = config.threshold_minutes, "app config saved");
    Ok(Json(config))
}

// -----------------------------
// DELETE /api/users/:user_id/apps/:app_id
// -----------------------------
pub async fn delete_app(
    State(state): State<AppState>,
    Path((user_id, app_id)): Path<(Uuid, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.require_user(user_id)?;
    if !state.repo.delete_app_config(user_id, &app_id)? {
        return Err(ApiError::NotFound("app not configured".to_string()));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

// -----------------------------
// GET /api/users/:user_id/quiet-hours
// Defaults to disabled 22:00-07:00
// -----------------------------
pub async fn get_quiet_hours(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<QuietHoursConfig>, ApiError> {
    state.require_user(user_id)?;
    let quiet = state.repo.get_quiet_hours(user_id)?.unwrap_or_default();
    Ok(Json(quiet))
}

// -----------------------------
// PUT /api/users/:user_id/quiet-hours
// -----------------------------
pub async fn put_quiet_hours(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(quiet): Json<QuietHoursConfig>,
) -> Result<Json<QuietHoursConfig>, ApiError> {
    state.require_user(user_id)?;
    state.repo.save_quiet_hours(user_id, quiet.clone())?;
    Ok(Json(quiet))
}
