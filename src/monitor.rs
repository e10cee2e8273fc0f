//! Periodic usage check.
//!
//! Every tick walks all users and their configured apps, evaluates the
//! latest observation of the day and dispatches the alerts that are not
//! suppressed. Apps are independent of each other; the engine itself keeps
//! no state, the cooldown is derived from the notification log.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Local};
use tokio::sync::watch;

use crate::dispatch::NotificationDispatcher;
use crate::error::StoreError;
use crate::models::{NotificationIntent, NotificationRecord, User};
use crate::policy;
use crate::store::Repository;
use crate::usage;

// Longest accepted cooldown, one week
pub const MAX_COOLDOWN_MINUTES: i64 = 7 * 24 * 60;

#[derive(Clone)]
pub struct Monitor {
    repo: Arc<dyn Repository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    cooldown: Duration,
}

impl Monitor {
    pub fn new(
        repo: Arc<dyn Repository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        cooldown_minutes: i64,
    ) -> Self {
        let clamped = cooldown_minutes.clamp(0, MAX_COOLDOWN_MINUTES);
        if clamped != cooldown_minutes {
            tracing::warn!(cooldown_minutes, used = clamped, "cooldown out of range, clamped");
        }
        Self {
            repo,
            dispatcher,
            cooldown: Duration::minutes(clamped),
        }
    }

    /// Run one check at `now`. Returns the intents that were dispatched.
    pub fn tick(&self, now: DateTime<FixedOffset>) -> Result<Vec<NotificationIntent>, StoreError> {
        let mut sent = Vec::new();
        for user in self.repo.list_users()? {
            self.check_user(&user, now, &mut sent)?;
        }
        tracing::debug!(dispatched = sent.len(), "monitor tick finished");
        Ok(sent)
    }

    fn check_user(
        &self,
        user: &User,
        now: DateTime<FixedOffset>,
        sent: &mut Vec<NotificationIntent>,
    ) -> Result<(), StoreError> {
        let configs = self.repo.list_app_configs(user.id)?;
        if configs.is_empty() {
            return Ok(());
        }
        let quiet = self.repo.get_quiet_hours(user.id)?;
        let records = self.repo.usage_since(user.id, now - Duration::days(1))?;
        let recent = self.repo.notifications_since(user.id, now - self.cooldown)?;
        let today = now.date_naive();

        for config in &configs {
            let Some(record) = usage::latest_for_day(&records, &config.app_id, today, now.offset())
            else {
                continue;
            };

            let intent = match policy::evaluate(&record.observation(), config, quiet.as_ref(), now) {
                Ok(intent) => intent,
                Err(e) => {
                    tracing::warn!(user_id = %user.id, app_id = %config.app_id, error = %e, "skipping app");
                    continue;
                }
            };
            if intent.suppressed {
                tracing::debug!(app_id = %intent.app_id, reason = ?intent.reason, "alert suppressed");
                continue;
            }
            if recent.iter().any(|n| n.app_id == config.app_id) {
                continue;
            }

            if let Err(e) = self.dispatcher.dispatch(user.id, &intent) {
                tracing::warn!(user_id = %user.id, app_id = %intent.app_id, error = %e, "dispatch failed");
                continue;
            }
            self.repo.record_notification(NotificationRecord {
                user_id: user.id,
                app_id: intent.app_id.clone(),
                level: intent.level,
                message: intent.message.clone().unwrap_or_default(),
                sent_at: now,
            })?;
            sent.push(intent);
        }
        Ok(())
    }

    /// Tick every `every` until `shutdown` flips to `true`.
    /// Ticks run on the blocking pool since the store does file I/O.
    pub async fn run(self, every: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(every);
        tracing::info!(interval_secs = every.as_secs(), "usage monitor started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let monitor = self.clone();
                    let now = Local::now().fixed_offset();
                    match tokio::task::spawn_blocking(move || monitor.tick(now)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => tracing::error!(error = %e, "monitor tick failed"),
                        Err(e) => tracing::error!(error = %e, "monitor tick aborted"),
                    }
                }
                changed = shutdown.changed() => {
                    let stop = changed.is_err() || *shutdown.borrow();
                    if stop {
                        break;
                    }
                }
            }
        }
        tracing::info!("usage monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::RecordingDispatcher;
    use crate::models::{
        AppThresholdConfig, NotificationLevel, QuietHoursConfig, UsageRecord,
    };
    use crate::policy::parse_hhmm;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 10, h, m, 0)
            .unwrap()
    }

    struct Fixture {
        repo: Arc<MemoryStore>,
        dispatcher: Arc<RecordingDispatcher>,
        monitor: Monitor,
        user: Uuid,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let user = Uuid::new_v4();
        repo.insert_user(User {
            id: user,
            nickname: "kim".to_string(),
            email: "kim@example.com".to_string(),
            password_hash: String::new(),
            created_at: at(0, 0),
        })
        .unwrap();
        for (app, threshold) in [("tiktok", 60), ("youtube", 90)] {
            repo.upsert_app_config(
                user,
                AppThresholdConfig {
                    app_id: app.to_string(),
                    threshold_minutes: threshold,
                    notification_level: NotificationLevel::Persistent,
                    custom_messages: vec!["Take a break".to_string()],
                },
                at(0, 0),
            )
            .unwrap();
        }
        let monitor = Monitor::new(repo.clone(), dispatcher.clone(), 15);
        Fixture { repo, dispatcher, monitor, user }
    }

    fn observe(f: &Fixture, app: &str, minutes: u32, when: DateTime<FixedOffset>) {
        f.repo
            .record_usage(UsageRecord {
                user_id: f.user,
                app_id: app.to_string(),
                usage_minutes: minutes,
                observed_at: when,
            })
            .unwrap();
    }

    #[test]
    fn dispatches_only_apps_over_threshold() {
        let f = fixture();
        observe(&f, "tiktok", 70, at(12, 0));
        observe(&f, "youtube", 30, at(12, 0));
        observe(&f, "netflix", 500, at(12, 0)); // not configured

        let sent = f.monitor.tick(at(12, 1)).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].app_id, "tiktok");
        assert_eq!(
            sent[0].message.as_deref(),
            Some("Take a break You're over your time limit.")
        );
        assert_eq!(f.dispatcher.sent.lock().unwrap().len(), 1);
        assert_eq!(f.repo.notifications_since(f.user, at(0, 0)).unwrap().len(), 1);
    }

    #[test]
    fn cooldown_prevents_repeat_alerts() {
        let f = fixture();
        observe(&f, "tiktok", 70, at(12, 0));

        assert_eq!(f.monitor.tick(at(12, 1)).unwrap().len(), 1);
        assert_eq!(f.monitor.tick(at(12, 10)).unwrap().len(), 0);
        assert_eq!(f.monitor.tick(at(12, 17)).unwrap().len(), 1);
    }

    #[test]
    fn quiet_hours_hold_back_alerts() {
        let f = fixture();
        f.repo
            .save_quiet_hours(
                f.user,
                QuietHoursConfig {
                    enabled: true,
                    start: parse_hhmm("22:00").unwrap(),
                    end: parse_hhmm("07:00").unwrap(),
                },
            )
            .unwrap();
        observe(&f, "tiktok", 70, at(22, 30));

        assert!(f.monitor.tick(at(23, 0)).unwrap().is_empty());
        assert!(f.dispatcher.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn yesterdays_usage_is_ignored() {
        let f = fixture();
        observe(&f, "tiktok", 70, at(12, 0) - Duration::days(1));
        assert!(f.monitor.tick(at(12, 1)).unwrap().is_empty());
    }

    #[test]
    fn invalid_config_is_skipped_not_fatal() {
        let f = fixture();
        f.repo
            .upsert_app_config(
                f.user,
                AppThresholdConfig {
                    app_id: "youtube".to_string(),
                    threshold_minutes: 0,
                    notification_level: NotificationLevel::Standard,
                    custom_messages: vec![],
                },
                at(0, 0),
            )
            .unwrap();
        observe(&f, "youtube", 10, at(12, 0));
        observe(&f, "tiktok", 70, at(12, 0));

        let sent = f.monitor.tick(at(12, 1)).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].app_id, "tiktok");
    }

    #[test]
    fn utc_observation_counts_for_the_local_day() {
        let f = fixture();
        let seoul = FixedOffset::east_opt(9 * 3600).unwrap();
        // 05:30 on the 11th in Seoul
        observe(&f, "tiktok", 90, at(20, 30));

        let now = seoul.with_ymd_and_hms(2024, 5, 11, 12, 0, 0).unwrap();
        let sent = f.monitor.tick(now).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].app_id, "tiktok");
    }

    #[test]
    fn cooldown_is_clamped() {
        let f = fixture();
        let monitor = Monitor::new(f.repo.clone(), f.dispatcher.clone(), i64::MAX);
        assert_eq!(monitor.cooldown, Duration::minutes(MAX_COOLDOWN_MINUTES));
        let monitor = Monitor::new(f.repo.clone(), f.dispatcher.clone(), -5);
        assert_eq!(monitor.cooldown, Duration::zero());

        observe(&f, "tiktok", 70, at(12, 0));
        assert_eq!(monitor.tick(at(12, 1)).unwrap().len(), 1);
    }

    #[test]
    fn huge_threshold_does_not_stop_the_tick() {
        let f = fixture();
        f.repo
            .upsert_app_config(
                f.user,
                AppThresholdConfig {
                    app_id: "youtube".to_string(),
                    threshold_minutes: i64::MAX,
                    notification_level: NotificationLevel::Standard,
                    custom_messages: vec![],
                },
                at(0, 0),
            )
            .unwrap();
        observe(&f, "youtube", u32::MAX, at(12, 0));
        observe(&f, "tiktok", 70, at(12, 0));

        let sent = f.monitor.tick(at(12, 1)).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].app_id, "tiktok");
    }

    #[tokio::test]
    async fn run_ticks_on_start() {
        let f = fixture();
        observe(&f, "tiktok", 70, Local::now().fixed_offset());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(f.monitor.clone().run(std::time::Duration::from_secs(3600), rx));
        for _ in 0..200 {
            if !f.dispatcher.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(f.dispatcher.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let f = fixture();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(f.monitor.run(std::time::Duration::from_secs(3600), rx));
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
