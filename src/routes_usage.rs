// --------------------------------------------------
// Handles usage observations, the dashboard summary
// and on-demand policy evaluation.
// -------------------------------------------------

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Duration, FixedOffset};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    AppThresholdConfig, NotificationIntent, QuietHoursConfig, UsageObservation, UsageRecord,
};
use crate::policy;
use crate::routes_apps::AppConfigInput;
use crate::state::{AppState, now_fixed_offset};
use crate::usage::{self, UsageSummary};

#[derive(Debug, Deserialize)]
pub struct UsageInput {
    pub app_id: String,
    pub usage_minutes: Option<u32>,
    pub usage_ms: Option<u64>, // as reported by the device collector
    pub observed_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateInput {
    pub usage_minutes: u32,
    pub observed_at: Option<DateTime<FixedOffset>>,
    pub now: Option<DateTime<FixedOffset>>,
    // Unsaved settings to preview instead of the stored ones
    pub config: Option<AppConfigInput>,
    pub quiet_hours: Option<QuietHoursConfig>,
}

// -----------------------------
// POST /api/users/:user_id/usage
// Records cumulative usage of one app for today
// -----------------------------
pub async fn record_usage(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<UsageInput>,
) -> Result<(StatusCode, Json<UsageRecord>), ApiError> {
    state.require_user(user_id)?;
    if input.app_id.trim().is_empty() {
        return Err(ApiError::BadRequest("app_id required".to_string()));
    }
    let usage_minutes = match (input.usage_minutes, input.usage_ms) {
        (Some(m), None) => m,
        (None, Some(ms)) => usage::ms_to_minutes(ms),
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of usage_minutes or usage_ms is required".to_string(),
            ));
        }
    };

    let record = UsageRecord {
        user_id,
        app_id: input.app_id.trim().to_string(),
        usage_minutes,
        observed_at: input.observed_at.unwrap_or_else(now_fixed_offset),
    };
    state.repo.record_usage(record.clone())?;
    tracing::debug!(%user_id, app_id = %record.app_id, usage_minutes, "usage recorded");
    Ok((StatusCode::CREATED, Json(record)))
}

// -----------------------------
// GET /api/users/:user_id/summary?days=7
// -----------------------------
pub async fn get_summary(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(q): Query<SummaryQuery>,
) -> Result<Json<UsageSummary>, ApiError> {
    state.require_user(user_id)?;
    let days = q.days.unwrap_or(7).clamp(1, 90);
    let now = now_fixed_offset();
    let today = now.date_naive();

    // two weeks at least, for the week-over-week change
    let lookback = i64::from(days.max(14));
    let since = (today - Duration::days(lookback - 1))
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(*now.offset()).single())
        .unwrap_or(now - Duration::days(lookback));

    let records = state.repo.usage_since(user_id, since)?;
    let configs = state.repo.list_app_configs(user_id)?;
    let window_start = now - Duration::days(i64::from(days));
    let notifications_sent = state.repo.notifications_since(user_id, window_start)?.len();

    let summary = usage::summarize(&records, &configs, notifications_sent, now, days)?;
    Ok(Json(summary))
}

// -----------------------------
// POST /api/users/:user_id/apps/:app_id/evaluate
// Runs the policy for one observation and returns the intent.
// `config` / `quiet_hours` in the body preview unsaved settings.
// -----------------------------
pub async fn evaluate(
    State(state): State<AppState>,
    Path((user_id, app_id)): Path<(Uuid, String)>,
    Json(input): Json<EvaluateInput>,
) -> Result<Json<NotificationIntent>, ApiError> {
    state.require_user(user_id)?;

    let config: AppThresholdConfig = match input.config {
        // not validated here: the engine rejects a bad threshold with 422
        Some(preview) => preview.normalize(&app_id),
        None => state
            .repo
            .get_app_config(user_id, &app_id)?
            .ok_or_else(|| ApiError::NotFound("app not configured".to_string()))?,
    };
    let quiet = match input.quiet_hours {
        Some(q) => Some(q),
        None => state.repo.get_quiet_hours(user_id)?,
    };

    let observed_at = input.observed_at.unwrap_or_else(now_fixed_offset);
    let observation = UsageObservation {
        app_id: app_id.clone(),
        usage_minutes: input.usage_minutes,
        observed_at,
    };
    let now = input.now.unwrap_or(observed_at);

    let intent = policy::evaluate(&observation, &config, quiet.as_ref(), now)?;
    Ok(Json(intent))
}
