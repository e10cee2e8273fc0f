// --------------------------------------------------
// Handles account endpoints.
//
// Responsibilities:
// - Register a new user
// - Log in with email + password
// -------------------------------------------------

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::auth::{self, PublicUser};
use crate::error::ApiError;
use crate::state::{AppState, now_fixed_offset};

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub nickname: String,
    pub email: String,
    pub password: String,
    pub confirm_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

// -----------------------------
// POST /api/users/register
// -----------------------------
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    if let Some(confirm) = &input.confirm_password {
        if *confirm != input.password {
            return Err(ApiError::BadRequest("Passwords do not match".to_string()));
        }
    }

    let user = auth::register(
        state.repo.as_ref(),
        &input.nickname,
        &input.email,
        &input.password,
        now_fixed_offset(),
    )?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

// -----------------------------
// POST /api/users/login
// -----------------------------
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = auth::login(state.repo.as_ref(), &input.email, &input.password)?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(user.into()))
}
