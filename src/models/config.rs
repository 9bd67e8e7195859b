use crate::models::config_validator::validate_config;
use crate::models::error::{BackupError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_client_secret_file")]
    pub client_secret_file: String,
    #[serde(default = "default_token_file")]
    pub token_file: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: u64,
    #[serde(default = "default_chunk_retries")]
    pub chunk_retries: u32,
    #[serde(default = "bool_false")]
    pub follow_all_pages: bool,
    #[serde(default = "bool_false")]
    pub continue_on_error: bool,
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
    #[serde(default = "bool_true")]
    pub compute_digest: bool,
    #[serde(default)]
    pub backup: BackupSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupSettings {
    #[serde(default)]
    pub root_folder_id: Option<String>,
    #[serde(default = "default_destination_parent")]
    pub destination_parent: String,
    #[serde(default = "default_destination_format")]
    pub destination_format: String,
    #[serde(default)]
    pub interval: IntervalSettings,
    /// Cron expression; takes precedence over `interval` when set.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "bool_true")]
    pub run_on_startup: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct IntervalSettings {
    #[serde(default)]
    pub seconds: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default)]
    pub hours: u64,
    #[serde(default)]
    pub days: u64,
}

impl IntervalSettings {
    pub fn total(&self) -> Duration {
        let seconds = self
            .seconds
            .saturating_add(self.minutes.saturating_mul(60))
            .saturating_add(self.hours.saturating_mul(3_600))
            .saturating_add(self.days.saturating_mul(86_400));
        Duration::from_secs(seconds)
    }

    pub fn is_zero(&self) -> bool {
        self.total().is_zero()
    }
}

/// What to do when two siblings map to the same local path within one run
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    #[default]
    Rename,
    Overwrite,
    Error,
}

fn default_client_secret_file() -> String {
    "credentials.json".to_string()
}
fn default_token_file() -> String {
    "token.json".to_string()
}
fn default_database_file() -> String {
    "backup_history.db".to_string()
}
fn default_destination_parent() -> String {
    ".".to_string()
}
fn default_destination_format() -> String {
    "%Y-%m-%d_%H-%M-%S".to_string()
}
const fn default_page_size() -> u32 {
    300
}
const fn default_chunk_size_bytes() -> u64 {
    1024 * 1024
}
const fn default_chunk_retries() -> u32 {
    2
}
const fn bool_false() -> bool {
    false
}
const fn bool_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_secret_file: default_client_secret_file(),
            token_file: default_token_file(),
            database_file: default_database_file(),
            page_size: default_page_size(),
            chunk_size_bytes: default_chunk_size_bytes(),
            chunk_retries: default_chunk_retries(),
            follow_all_pages: false,
            continue_on_error: false,
            collision_policy: CollisionPolicy::default(),
            compute_digest: true,
            backup: BackupSettings::default(),
        }
    }
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            root_folder_id: None,
            destination_parent: default_destination_parent(),
            destination_format: default_destination_format(),
            interval: IntervalSettings::default(),
            schedule: None,
            run_on_startup: true,
        }
    }
}

pub fn setup_config(config_file: &str) -> Result<Config> {
    let config_path = PathBuf::from(config_file);
    info!("Loading config from: {}", config_path.display());

    let config_str = fs::read_to_string(&config_path).map_err(|cause| {
        BackupError::ConfigRead {
            path: config_path.clone(),
            cause,
        }
    })?;

    let config: Config = serde_json::from_str(&config_str).map_err(|cause| {
        BackupError::ConfigParse {
            path: config_path,
            cause,
        }
    })?;

    validate_config(&config)?;

    Ok(config)
}
