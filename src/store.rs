use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    AppThresholdConfig, Db, NotificationRecord, QuietHoursConfig, StoredAppConfig, UsageRecord,
    User, UserSettings,
};

/// Configuration store and usage log.
///
/// Handlers and the monitor only talk to this trait, so the JSON file can be
/// swapped for [`MemoryStore`] in tests.
pub trait Repository: Send + Sync {
    fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    fn find_user_by_nickname(&self, nickname: &str) -> Result<Option<User>, StoreError>;
    fn insert_user(&self, user: User) -> Result<(), StoreError>;
    fn list_users(&self) -> Result<Vec<User>, StoreError>;

    fn get_app_config(
        &self,
        user_id: Uuid,
        app_id: &str,
    ) -> Result<Option<AppThresholdConfig>, StoreError>;
    fn list_app_configs(&self, user_id: Uuid) -> Result<Vec<AppThresholdConfig>, StoreError>;
    fn upsert_app_config(
        &self,
        user_id: Uuid,
        config: AppThresholdConfig,
        now: DateTime<FixedOffset>,
    ) -> Result<(), StoreError>;
    /// Returns `false` when there was nothing to delete.
    fn delete_app_config(&self, user_id: Uuid, app_id: &str) -> Result<bool, StoreError>;

    fn get_quiet_hours(&self, user_id: Uuid) -> Result<Option<QuietHoursConfig>, StoreError>;
    fn save_quiet_hours(&self, user_id: Uuid, quiet: QuietHoursConfig) -> Result<(), StoreError>;

    fn record_usage(&self, record: UsageRecord) -> Result<(), StoreError>;
    fn usage_since(
        &self,
        user_id: Uuid,
        since: DateTime<FixedOffset>,
    ) -> Result<Vec<UsageRecord>, StoreError>;

    fn record_notification(&self, record: NotificationRecord) -> Result<(), StoreError>;
    fn notifications_since(
        &self,
        user_id: Uuid,
        since: DateTime<FixedOffset>,
    ) -> Result<Vec<NotificationRecord>, StoreError>;
}

// Backends that hold the whole `Db` document.
// `Repository` is implemented once on top of these two accessors.
pub trait DbAccess: Send + Sync {
    fn read<R>(&self, f: impl FnOnce(&Db) -> R) -> Result<R, StoreError>;
    fn write<R>(&self, f: impl FnOnce(&mut Db) -> R) -> Result<R, StoreError>;
}

impl<T: DbAccess> Repository for T {
    fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.read(|db| db.users.iter().find(|u| u.id == id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim().to_lowercase();
        self.read(|db| db.users.iter().find(|u| u.email == email).cloned())
    }

    fn find_user_by_nickname(&self, nickname: &str) -> Result<Option<User>, StoreError> {
        let nickname = nickname.trim();
        self.read(|db| db.users.iter().find(|u| u.nickname == nickname).cloned())
    }

    fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.write(|db| db.users.push(user))
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.read(|db| db.users.clone())
    }

    fn get_app_config(
        &self,
        user_id: Uuid,
        app_id: &str,
    ) -> Result<Option<AppThresholdConfig>, StoreError> {
        self.read(|db| {
            db.app_configs
                .iter()
                .find(|c| c.user_id == user_id && c.config.app_id == app_id)
                .map(|c| c.config.clone())
        })
    }

    fn list_app_configs(&self, user_id: Uuid) -> Result<Vec<AppThresholdConfig>, StoreError> {
        self.read(|db| {
            db.app_configs
                .iter()
                .filter(|c| c.user_id == user_id)
                .map(|c| c.config.clone())
                .collect()
        })
    }

    fn upsert_app_config(
        &self,
        user_id: Uuid,
        config: AppThresholdConfig,
        now: DateTime<FixedOffset>,
    ) -> Result<(), StoreError> {
        self.write(|db| {
            match db
                .app_configs
                .iter_mut()
                .find(|c| c.user_id == user_id && c.config.app_id == config.app_id)
            {
                Some(existing) => {
                    existing.config = config;
                    existing.updated_at = now;
                }
                None => db.app_configs.push(StoredAppConfig {
                    user_id,
                    config,
                    updated_at: now,
                }),
            }
        })
    }

    fn delete_app_config(&self, user_id: Uuid, app_id: &str) -> Result<bool, StoreError> {
        self.write(|db| {
            let before = db.app_configs.len();
            db.app_configs
                .retain(|c| !(c.user_id == user_id && c.config.app_id == app_id));
            db.app_configs.len() != before
        })
    }

    fn get_quiet_hours(&self, user_id: Uuid) -> Result<Option<QuietHoursConfig>, StoreError> {
        self.read(|db| {
            db.user_settings
                .iter()
                .find(|s| s.user_id == user_id)
                .map(|s| s.quiet_hours.clone())
        })
    }

    fn save_quiet_hours(&self, user_id: Uuid, quiet: QuietHoursConfig) -> Result<(), StoreError> {
        self.write(|db| {
            match db.user_settings.iter_mut().find(|s| s.user_id == user_id) {
                Some(existing) => existing.quiet_hours = quiet,
                None => db.user_settings.push(UserSettings {
                    user_id,
                    quiet_hours: quiet,
                }),
            }
        })
    }

    fn record_usage(&self, record: UsageRecord) -> Result<(), StoreError> {
        self.write(|db| db.usage.push(record))
    }

    fn usage_since(
        &self,
        user_id: Uuid,
        since: DateTime<FixedOffset>,
    ) -> Result<Vec<UsageRecord>, StoreError> {
        self.read(|db| {
            db.usage
                .iter()
                .filter(|r| r.user_id == user_id && r.observed_at >= since)
                .cloned()
                .collect()
        })
    }

    fn record_notification(&self, record: NotificationRecord) -> Result<(), StoreError> {
        self.write(|db| db.notifications.push(record))
    }

    fn notifications_since(
        &self,
        user_id: Uuid,
        since: DateTime<FixedOffset>,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        self.read(|db| {
            db.notifications
                .iter()
                .filter(|n| n.user_id == user_id && n.sent_at >= since)
                .cloned()
                .collect()
        })
    }
}

// Whole database in one JSON file.
// Every write rewrites the file through a temp file + rename.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn load_db(path: &Path) -> Result<Db, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Db::default()),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&text)?)
}

pub fn save_db(path: &Path, db: &Db) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("json.tmp");
    let text = serde_json::to_string_pretty(db)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&tmp_path, text)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

impl DbAccess for JsonFileStore {
    fn read<R>(&self, f: impl FnOnce(&Db) -> R) -> Result<R, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let db = load_db(&self.path)?;
        Ok(f(&db))
    }

    fn write<R>(&self, f: impl FnOnce(&mut Db) -> R) -> Result<R, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut db = load_db(&self.path)?;
        let out = f(&mut db);
        save_db(&self.path, &db)?;
        Ok(out)
    }
}

// In-memory double, nothing is persisted.
#[derive(Default)]
pub struct MemoryStore {
    db: Mutex<Db>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DbAccess for MemoryStore {
    fn read<R>(&self, f: impl FnOnce(&Db) -> R) -> Result<R, StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&db))
    }

    fn write<R>(&self, f: impl FnOnce(&mut Db) -> R) -> Result<R, StoreError> {
        let mut db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationLevel;
    use chrono::TimeZone;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .unwrap()
    }

    fn app(app_id: &str, threshold: i64) -> AppThresholdConfig {
        AppThresholdConfig {
            app_id: app_id.to_string(),
            threshold_minutes: threshold,
            notification_level: NotificationLevel::Standard,
            custom_messages: vec![],
        }
    }

    fn exercise(repo: &dyn Repository) {
        let user = Uuid::new_v4();
        repo.upsert_app_config(user, app("tiktok", 60), now()).unwrap();
        repo.upsert_app_config(user, app("youtube", 30), now()).unwrap();
        repo.upsert_app_config(user, app("tiktok", 90), now()).unwrap();

        let configs = repo.list_app_configs(user).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(repo.get_app_config(user, "tiktok").unwrap().unwrap().threshold_minutes, 90);
        assert!(repo.get_app_config(Uuid::new_v4(), "tiktok").unwrap().is_none());

        assert!(repo.delete_app_config(user, "youtube").unwrap());
        assert!(!repo.delete_app_config(user, "youtube").unwrap());

        assert!(repo.get_quiet_hours(user).unwrap().is_none());
        let q = QuietHoursConfig {
            enabled: true,
            ..QuietHoursConfig::default()
        };
        repo.save_quiet_hours(user, q.clone()).unwrap();
        assert_eq!(repo.get_quiet_hours(user).unwrap(), Some(q));
    }

    #[test]
    fn memory_store_configs() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn json_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.json");

        let store = JsonFileStore::new(&path);
        exercise(&store);
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.list_users().unwrap().len(), 0);
        // "tiktok" survived, "youtube" was deleted
        let user = reopened.read(|db| db.app_configs[0].user_id).unwrap();
        let left = reopened.list_app_configs(user).unwrap();
        assert_eq!(left, vec![app("tiktok", 90)]);
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("db.json"));
        assert!(store.list_users().unwrap().is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.list_users(), Err(StoreError::Json(_))));
    }

    #[test]
    fn usage_since_filters_by_user_and_time() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        for (uid, mins, hours_ago) in [(user, 10, 30), (user, 20, 1), (other, 5, 1)] {
            store
                .record_usage(UsageRecord {
                    user_id: uid,
                    app_id: "tiktok".to_string(),
                    usage_minutes: mins,
                    observed_at: now() - chrono::Duration::hours(hours_ago),
                })
                .unwrap();
        }
        let recent = store.usage_since(user, now() - chrono::Duration::hours(24)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].usage_minutes, 20);
    }
}
