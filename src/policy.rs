/*
Usage-threshold evaluation and notification policy.
Module was independently written from HTTP / Axum for testing
*/


use chrono::{DateTime, FixedOffset, NaiveTime, Timelike};

use crate::error::PolicyError;
use crate::models::{
    AppThresholdConfig, NotificationIntent, NotificationLevel, QuietHoursConfig,
    SuppressionReason, UsageObservation, UsageStatus,
};

pub const FALLBACK_MESSAGE: &str = "You've reached your time limit.";

// Percent at which an app card switches to "near limit"
pub const NEAR_LIMIT_PERCENT: u8 = 75;

impl NotificationLevel {
    // Text appended to the notification message for each level.
    // The notification preview renders the same strings, so keep them in sync.
    pub fn message_suffix(self) -> &'static str {
        match self {
            NotificationLevel::Standard => "",
            NotificationLevel::Persistent => " You're over your time limit.",
            NotificationLevel::FullScreen => " Please take a break now.",
        }
    }
}

// Parse a "HH:MM" (24h) string into a time of day.
pub fn parse_hhmm(hhmm: &str) -> Option<NaiveTime> {
    let (h, m) = hhmm.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(h, m, 0)
}

fn validate_threshold(threshold_minutes: i64) -> Result<(), PolicyError> {
    if threshold_minutes <= 0 {
        return Err(PolicyError::InvalidConfiguration { threshold_minutes });
    }
    Ok(())
}

// round(usage / threshold * 100), half rounds up, capped at 100
pub fn usage_percent(usage_minutes: u32, threshold_minutes: i64) -> Result<u8, PolicyError> {
    validate_threshold(threshold_minutes)?;
    // i128 so any positive i64 threshold fits
    let usage = i128::from(usage_minutes);
    let threshold = i128::from(threshold_minutes);
    let pct = (200 * usage + threshold) / (2 * threshold);
    Ok(pct.min(100) as u8)
}

// Whether `now` falls inside the quiet window.
//
// Rules:
// - disabled -> never active
// - start == end -> empty window
// - start < end -> start <= now < end
// - start > end (wraps midnight) -> now >= start OR now < end
pub fn quiet_hours_active(quiet: &QuietHoursConfig, now: NaiveTime) -> bool {
    if !quiet.enabled {
        return false;
    }
    // minute resolution, matching the HH:MM configuration
    let now = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(now);
    let (start, end) = (quiet.start, quiet.end);
    if start < end {
        start <= now && now < end
    } else if start > end {
        start <= now || now < end
    } else {
        false
    }
}

// First custom message (or the fallback) plus the level suffix.
pub fn compose_message(custom_messages: &[String], level: NotificationLevel) -> String {
    let base = custom_messages
        .first()
        .map(String::as_str)
        .unwrap_or(FALLBACK_MESSAGE);
    format!("{base}{}", level.message_suffix())
}

/// Decide whether a notification should be shown for one app at `now`.
///
/// Process:
/// - Reject `threshold_minutes <= 0`
/// - Below threshold -> suppressed (under-threshold), no message
/// - At/over threshold inside quiet hours -> suppressed (quiet-hours), no message
/// - Otherwise -> notify at the configured level
///
/// The level is always the configured one; the engine never escalates.
pub fn evaluate(
    observation: &UsageObservation,
    config: &AppThresholdConfig,
    quiet_hours: Option<&QuietHoursConfig>,
    now: DateTime<FixedOffset>,
) -> Result<NotificationIntent, PolicyError> {
    let usage_percent = usage_percent(observation.usage_minutes, config.threshold_minutes)?;

    let mut intent = NotificationIntent {
        app_id: observation.app_id.clone(),
        usage_minutes: observation.usage_minutes,
        threshold_minutes: config.threshold_minutes,
        usage_percent,
        level: config.notification_level,
        message: None,
        suppressed: true,
        reason: SuppressionReason::UnderThreshold,
    };

    if i64::from(observation.usage_minutes) < config.threshold_minutes {
        return Ok(intent);
    }

    if quiet_hours.is_some_and(|q| quiet_hours_active(q, now.time())) {
        intent.reason = SuppressionReason::QuietHours;
        return Ok(intent);
    }

    intent.suppressed = false;
    intent.reason = SuppressionReason::None;
    intent.message = Some(compose_message(&config.custom_messages, config.notification_level));
    Ok(intent)
}

// Badge shown on the dashboard card:
//     usage >= threshold -> over_limit
//     percent >= 75      -> near_limit
//     otherwise          -> good
pub fn usage_status(usage_minutes: u32, threshold_minutes: i64) -> Result<UsageStatus, PolicyError> {
    let pct = usage_percent(usage_minutes, threshold_minutes)?;
    let status = if i64::from(usage_minutes) >= threshold_minutes {
        UsageStatus::OverLimit
    } else if pct >= NEAR_LIMIT_PERCENT {
        UsageStatus::NearLimit
    } else {
        UsageStatus::Good
    };
    Ok(status)
}
