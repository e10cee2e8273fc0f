use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::User;
use crate::store::Repository;

// Shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    // Every per-user route starts here; unknown ids are 404
    pub fn require_user(&self, user_id: Uuid) -> Result<User, ApiError> {
        self.repo
            .find_user(user_id)?
            .ok_or_else(|| ApiError::NotFound("user not found".to_string()))
    }
}

// Local time with the current system offset
pub fn now_fixed_offset() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}
