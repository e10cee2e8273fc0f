use chrono::{DateTime, FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Notification intensity chosen by the user per app
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationLevel {
    #[default]
    Standard,   // dismissible banner
    Persistent, // banner that requires interaction
    FullScreen, // full-screen interrupt
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SuppressionReason {
    None,
    QuietHours,
    UnderThreshold,
}

// Dashboard badge for an app card
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Good,
    NearLimit,
    OverLimit,
}

// Cumulative usage of one app for the current local day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageObservation {
    pub app_id: String,
    pub usage_minutes: u32,
    pub observed_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppThresholdConfig {
    pub app_id: String,
    pub threshold_minutes: i64, // must be > 0
    #[serde(default)]
    pub notification_level: NotificationLevel,
    #[serde(default)]
    pub custom_messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuietHoursConfig {
    pub enabled: bool,
    #[serde(with = "hhmm")]
    pub start: NaiveTime, // "HH:MM"
    #[serde(with = "hhmm")]
    pub end: NaiveTime, // "HH:MM", may be earlier than start (wraps midnight)
}

impl Default for QuietHoursConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
        }
    }
}

// Output of the policy engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationIntent {
    pub app_id: String,
    pub usage_minutes: u32,
    pub threshold_minutes: i64,
    pub usage_percent: u8, // 0..=100
    pub level: NotificationLevel,
    pub message: Option<String>, // present only when not suppressed
    pub suppressed: bool,
    pub reason: SuppressionReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub nickname: String,
    pub email: String,         // lower-cased
    pub password_hash: String, // argon2 PHC string
    pub created_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAppConfig {
    pub user_id: Uuid,
    pub config: AppThresholdConfig,
    pub updated_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: Uuid,
    pub quiet_hours: QuietHoursConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: Uuid,
    pub app_id: String,
    pub usage_minutes: u32,
    pub observed_at: DateTime<FixedOffset>,
}

impl UsageRecord {
    pub fn observation(&self) -> UsageObservation {
        UsageObservation {
            app_id: self.app_id.clone(),
            usage_minutes: self.usage_minutes,
            observed_at: self.observed_at,
        }
    }
}

// A notification that was actually dispatched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub user_id: Uuid,
    pub app_id: String,
    pub level: NotificationLevel,
    pub message: String,
    pub sent_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Db {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub app_configs: Vec<StoredAppConfig>,
    #[serde(default)]
    pub user_settings: Vec<UserSettings>,
    #[serde(default)]
    pub usage: Vec<UsageRecord>,
    #[serde(default)]
    pub notifications: Vec<NotificationRecord>,
}

// "HH:MM" (de)serialization for time-of-day fields
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let text = String::deserialize(d)?;
        crate::policy::parse_hhmm(&text)
            .ok_or_else(|| D::Error::custom(format!("invalid time of day '{text}', expected HH:MM")))
    }
}
