use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::{NotificationIntent, NotificationLevel};

// Delivers a notification to the user's device.
// Only called for intents that are not suppressed.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, user_id: Uuid, intent: &NotificationIntent) -> Result<(), DispatchError>;
}

// How each level is presented on the device
pub fn presentation(level: NotificationLevel) -> &'static str {
    match level {
        NotificationLevel::Standard => "dismissible banner",
        NotificationLevel::Persistent => "interaction-required banner",
        NotificationLevel::FullScreen => "full-screen interrupt",
    }
}

// Stand-in for the device notification service: writes the notification to the log.
#[derive(Debug, Default, Clone)]
pub struct TracingDispatcher;

impl NotificationDispatcher for TracingDispatcher {
    fn dispatch(&self, user_id: Uuid, intent: &NotificationIntent) -> Result<(), DispatchError> {
        let Some(message) = intent.message.as_deref() else {
            return Err(DispatchError::Unavailable(format!(
                "intent for {} has no message",
                intent.app_id
            )));
        };
        tracing::info!(
            %user_id,
            app_id = %intent.app_id,
            level = ?intent.level,
            presentation = presentation(intent.level),
            usage_percent = intent.usage_percent,
            text = message,
            "usage alert"
        );
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    // Collects dispatched intents for assertions
    #[derive(Default)]
    pub struct RecordingDispatcher {
        pub sent: Mutex<Vec<(Uuid, NotificationIntent)>>,
    }

    impl NotificationDispatcher for RecordingDispatcher {
        fn dispatch(&self, user_id: Uuid, intent: &NotificationIntent) -> Result<(), DispatchError> {
            self.sent
                .lock()
                .map_err(|_| DispatchError::Unavailable("poisoned".to_string()))?
                .push((user_id, intent.clone()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SuppressionReason;

    fn intent(message: Option<&str>) -> NotificationIntent {
        NotificationIntent {
            app_id: "tiktok".to_string(),
            usage_minutes: 70,
            threshold_minutes: 60,
            usage_percent: 100,
            level: NotificationLevel::Persistent,
            message: message.map(str::to_string),
            suppressed: message.is_none(),
            reason: if message.is_some() {
                SuppressionReason::None
            } else {
                SuppressionReason::UnderThreshold
            },
        }
    }

    #[test]
    fn tracing_dispatcher_needs_a_message() {
        let d = TracingDispatcher;
        assert!(d.dispatch(Uuid::nil(), &intent(Some("Take a break"))).is_ok());
        assert!(d.dispatch(Uuid::nil(), &intent(None)).is_err());
    }
}
