//! Runtime configuration.
//!
//! Sources, later ones win:
//! 1. built-in defaults
//! 2. `usage_monitor.toml` (or the file named by `USAGE_MONITOR_CONFIG`), optional
//! 3. `USAGE_MONITOR__<SECTION>__<KEY>` environment variables

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "usage_monitor.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Keep everything in memory (demo mode).
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between usage checks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Minimum minutes between two notifications for the same app.
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `trace` .. `error`; `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,
    /// `pretty` or `json`.
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_db_path() -> String {
    "data/db.json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    60
}

fn default_cooldown_minutes() -> i64 {
    15
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: default_addr() }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            in_memory: false,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_interval_secs(),
            cooldown_minutes: default_cooldown_minutes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("USAGE_MONITOR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("USAGE_MONITOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg = AppConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.storage.db_path, "data/db.json");
        assert_eq!(cfg.monitor.interval_secs, 60);
        assert_eq!(cfg.monitor.cooldown_minutes, 15);
        assert!(cfg.monitor.enabled);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage_monitor.toml");
        std::fs::write(
            &path,
            "[server]\naddr = \"0.0.0.0:8080\"\n\n[monitor]\ninterval_secs = 5\n",
        )
        .unwrap();
        let cfg = AppConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.addr, "0.0.0.0:8080");
        assert_eq!(cfg.monitor.interval_secs, 5);
        assert_eq!(cfg.monitor.cooldown_minutes, 15);
        assert_eq!(cfg.logging.format, "pretty");
    }
}
