use serde::Deserialize;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;

use crate::error::ConfigError;

// Main configuration struct
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub imap: ImapConfig,
    pub paths: PathsConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImapConfig {
    pub server: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    /// Upper bound on messages fetched in a single pass.
    #[serde(default)]
    pub max_messages: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    pub attachments_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub db_connection_string: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    /// Sender address; `smtp_username` is used when absent.
    #[serde(default)]
    pub from: Option<String>,
    /// Recipient of summaries and error alerts.
    #[serde(default)]
    pub email: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from: None,
            email: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            tick_seconds: default_tick_seconds(),
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.level).map_err(|_| ConfigError::Invalid {
            key: "logging.level",
            reason: format!("unknown level {:?}", self.level),
        })
    }
}

fn default_imap_port() -> u16 {
    993
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_interval_minutes() -> u64 {
    10
}

fn default_tick_seconds() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "scheduler.interval_minutes",
                reason: "must be at least 1".to_string(),
            });
        }
        // chrono arithmetic on the schedule clock is bounded by i64 milliseconds
        if chrono::Duration::from_std(self.scheduler.interval()).is_err() {
            return Err(ConfigError::Invalid {
                key: "scheduler.interval_minutes",
                reason: "out of range".to_string(),
            });
        }
        if self.scheduler.tick_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "scheduler.tick_seconds",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.notification.enabled && self.notification.email.is_empty() {
            return Err(ConfigError::Invalid {
                key: "notification.email",
                reason: "required when notifications are enabled".to_string(),
            });
        }
        self.logging.level_filter()?;
        Ok(())
    }
}

pub fn parse_settings(source: &str, path: &Path) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(source).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

pub fn load_settings(path: &Path) -> Result<Config, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let source = std::io::read_to_string(BufReader::new(file)).map_err(|source| ConfigError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    parse_settings(&source, path)
}
