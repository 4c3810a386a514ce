//! Store configuration.
//!
//! Values come from `CRM_*` environment variables, falling back to defaults:
//! - `CRM_DB_PATH`: SQLite file (default `./data/crm.sqlite3`)
//! - `CRM_BUSY_TIMEOUT_MS`: lock wait in milliseconds (default 5000)
//! - `CRM_LOG_LEVEL`: log level (default depends on build mode)
//! - `CRM_LOG_DIR`: log directory; unset disables file logging
//! - `CRM_PAGE_SIZE`: page size for table queries asking for `0` (default 10)

use crate::db::{ConnectionProvider, DEFAULT_BUSY_TIMEOUT};
use crate::logging::default_log_level;
use crate::repo::{RepositoryOptions, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "CRM_DB_PATH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "CRM_BUSY_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "CRM_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "CRM_LOG_DIR";
pub const ENV_PAGE_SIZE: &str = "CRM_PAGE_SIZE";

const DEFAULT_DB_PATH: &str = "./data/crm.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNumber { key: &'static str, value: String },
    OutOfRange { key: &'static str, value: u64 },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer, got `{value}`")
            }
            Self::OutOfRange { key, value } => write!(f, "{key} value {value} is out of range"),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub busy_timeout: Duration,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub default_page_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            log_level: default_log_level().to_string(),
            log_dir: None,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl StoreConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = read(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(raw) = read(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout = Duration::from_millis(parse_number(ENV_BUSY_TIMEOUT_MS, &raw)?);
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = level;
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            config.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = read(ENV_PAGE_SIZE) {
            let size = parse_number(ENV_PAGE_SIZE, &raw)?;
            config.default_page_size = match u32::try_from(size) {
                Ok(size @ 1..=MAX_PAGE_SIZE) => size,
                _ => {
                    return Err(ConfigError::OutOfRange {
                        key: ENV_PAGE_SIZE,
                        value: size,
                    })
                }
            };
        }

        Ok(config)
    }

    pub fn connection_provider(&self) -> ConnectionProvider {
        ConnectionProvider::new(self.db_path.clone(), self.busy_timeout)
    }

    pub fn repository_options(&self) -> RepositoryOptions {
        RepositoryOptions {
            default_page_size: self.default_page_size,
            ..RepositoryOptions::default()
        }
    }
}

fn parse_number(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: raw.to_string(),
    })
}
