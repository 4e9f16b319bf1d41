use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime configuration, loaded from a JSON file. Every field has a
/// default so a partial (or absent) file is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file for the relational backend.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory for the key-value fallback backend.
    #[serde(default = "default_kv_path")]
    pub kv_path: PathBuf,

    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    #[serde(default = "default_delivery_poll_secs")]
    pub delivery_poll_secs: u64,

    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: i64,

    /// Time-of-day new automation rules start with, as "HH:MM".
    #[serde(default = "default_send_time_text")]
    pub default_send_time: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("outreach.db")
}

fn default_kv_path() -> PathBuf {
    PathBuf::from("outreach.kv")
}

fn default_sync_interval_secs() -> u64 {
    300
}

fn default_delivery_poll_secs() -> u64 {
    60
}

fn default_max_send_attempts() -> i64 {
    3
}

fn default_send_time_text() -> String {
    "09:00".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            kv_path: default_kv_path(),
            sync_interval_secs: default_sync_interval_secs(),
            delivery_poll_secs: default_delivery_poll_secs(),
            max_send_attempts: default_max_send_attempts(),
            default_send_time: default_send_time_text(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn delivery_poll(&self) -> Duration {
        Duration::from_secs(self.delivery_poll_secs)
    }

    /// Parsed `default_send_time`; "HH:MM:SS" is accepted too. An
    /// unparseable value falls back to 09:00 with a warning.
    pub fn default_send_time(&self) -> NaiveTime {
        NaiveTime::parse_from_str(&self.default_send_time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&self.default_send_time, "%H:%M:%S"))
            .unwrap_or_else(|_| {
                warn!(
                    "unparseable default_send_time {:?}, using 09:00",
                    self.default_send_time
                );
                crate::db::automation_rule::default_send_time()
            })
    }
}
