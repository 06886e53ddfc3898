//! API configuration
//!
//! Loaded from an optional `config/ubind.{toml,yaml,json}` file overlaid by
//! `API_`-prefixed environment variables. Nested keys use `__`, so
//! `API_DATABASE__URL` sets `database.url` and
//! `API_QUOTES__QUOTE_EXPIRY_DAYS` sets `quotes.quote_expiry_days`.

use chrono::{NaiveTime, Weekday};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use app_services::QuoteSettings;
use infra_db::DatabaseConfig;
use infra_updater::{DataSetKind, QueueConfig, Schedule, ScheduledUpdate, UpdaterSettings};

/// Where aggregates, read models and updater jobs are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory; lost on restart
    #[default]
    Memory,
    Postgres,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    pub storage: StorageBackend,
    pub database: DatabaseConfig,
    pub lock_timeout_secs: u64,
    /// Directory of `<product id>.json` rating documents
    pub rating_rules_dir: Option<PathBuf>,
    pub quotes: QuoteSettings,
    pub updater: UpdaterConfig,
    /// Administrator created at startup when missing
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// First organisation and administrator of a tenant
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub tenant_id: uuid::Uuid,
    pub organisation_name: String,
    pub organisation_alias: String,
    pub email: String,
    pub password: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            log_level: "info".to_string(),
            log_json: false,
            storage: StorageBackend::default(),
            database: DatabaseConfig::default(),
            lock_timeout_secs: 10,
            rating_rules_dir: None,
            quotes: QuoteSettings::default(),
            updater: UpdaterConfig::default(),
            bootstrap_admin: None,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from the optional file and the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("config/ubind").required(false))
            .add_source(
                config::Environment::with_prefix("API")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

/// Reference data updater settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    pub work_dir: PathBuf,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub import_batch_size: usize,
    pub download_timeout_secs: u64,
    /// Download location per data set
    pub sources: HashMap<DataSetKind, String>,
    pub schedules: Vec<ScheduleConfig>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        let defaults = UpdaterSettings::default();
        Self {
            work_dir: defaults.work_dir,
            worker_count: defaults.queue.worker_count,
            queue_capacity: defaults.queue.capacity,
            import_batch_size: defaults.import_batch_size,
            download_timeout_secs: defaults.download_timeout.as_secs(),
            sources: HashMap::new(),
            schedules: Vec::new(),
        }
    }
}

impl UpdaterConfig {
    pub fn to_settings(&self) -> UpdaterSettings {
        UpdaterSettings {
            work_dir: self.work_dir.clone(),
            queue: QueueConfig {
                capacity: self.queue_capacity.max(1),
                worker_count: self.worker_count.max(1),
            },
            import_batch_size: self.import_batch_size.max(1),
            download_timeout: Duration::from_secs(self.download_timeout_secs),
            sources: self.sources.clone(),
            schedules: self.schedules.iter().map(ScheduleConfig::to_scheduled).collect(),
        }
    }
}

/// One recurring update, e.g. `{ data_set = "gnaf", every = "week", weekday = "Sun", at = "02:00:00" }`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleConfig {
    pub data_set: DataSetKind,
    #[serde(flatten)]
    pub every: Every,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "every", rename_all = "snake_case")]
pub enum Every {
    Day { at: NaiveTime },
    Week { weekday: Weekday, at: NaiveTime },
    Interval { seconds: u64 },
}

impl ScheduleConfig {
    pub fn to_scheduled(&self) -> ScheduledUpdate {
        let schedule = match self.every {
            Every::Day { at } => Schedule::Daily { at },
            Every::Week { weekday, at } => Schedule::Weekly { weekday, at },
            Every::Interval { seconds } => Schedule::Interval {
                every: chrono::Duration::from_std(Duration::from_secs(seconds.max(1)))
                    .unwrap_or(chrono::Duration::MAX),
            },
        };
        ScheduledUpdate {
            data_set: self.data_set,
            schedule,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.quotes.quote_expiry_days, 30);
        assert_eq!(config.lock_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config: ApiConfig = serde_json::from_value(json!({
            "port": 9000,
            "storage": "postgres",
            "quotes": { "renewal_window_days": 45 }
        }))
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(config.quotes.renewal_window_days, 45);
        assert_eq!(config.quotes.quote_expiry_days, 30);
    }

    #[test]
    fn test_schedules_convert() {
        let updater: UpdaterConfig = serde_json::from_value(json!({
            "worker_count": 0,
            "sources": { "gnaf": "https://data.example/gnaf.zip" },
            "schedules": [
                { "data_set": "gnaf", "every": "week", "weekday": "Sun", "at": "02:00:00" },
                { "data_set": "red_book", "every": "interval", "seconds": 3600 }
            ]
        }))
        .unwrap();

        let settings = updater.to_settings();
        assert_eq!(settings.queue.worker_count, 1);
        assert_eq!(settings.sources[&DataSetKind::Gnaf], "https://data.example/gnaf.zip");
        assert_eq!(
            settings.schedules[0].schedule,
            Schedule::Weekly {
                weekday: Weekday::Sun,
                at: NaiveTime::from_hms_opt(2, 0, 0).unwrap()
            }
        );
        assert_eq!(
            settings.schedules[1].schedule,
            Schedule::Interval {
                every: chrono::Duration::seconds(3600)
            }
        );
    }
}
