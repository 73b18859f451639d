use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::queue::{DEFAULT_MAX_PERMANENT_FAILURES, QueueConfig};
use crate::resolver::{DEFAULT_REQUEST_TIMEOUT, ResolverConfig};

const DEFAULT_DB_PATH: &str = "learnsync.sqlite";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("LEARN_API_BASE_URL is missing (set LEARNSYNC_FORCE_OFFLINE=1 to run without a remote)")]
    MissingBaseUrl,
    #[error("LEARNSYNC_REQUEST_TIMEOUT_SECS must be greater than zero")]
    ZeroTimeout,
    #[error("failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub db_path: PathBuf,
    pub force_offline: bool,
    pub request_timeout: Duration,
    pub max_permanent_failures: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: None,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            force_offline: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_permanent_failures: DEFAULT_MAX_PERMANENT_FAILURES,
        }
    }
}

impl SyncConfig {
    /// Load `.env.local` or `.env` if present, then read the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new(".env.local").exists() {
            dotenvy::from_filename(".env.local")?;
        } else if Path::new(".env").exists() {
            dotenvy::from_filename(".env")?;
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("LEARN_API_BASE_URL") {
            config.base_url = url.trim().to_string();
        }
        config.api_token = get("LEARN_API_TOKEN");
        if let Some(path) = get("LEARNSYNC_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(raw) = get("LEARNSYNC_FORCE_OFFLINE") {
            config.force_offline = parse_bool("LEARNSYNC_FORCE_OFFLINE", &raw)?;
        }
        if let Some(raw) = get("LEARNSYNC_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "LEARNSYNC_REQUEST_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("LEARNSYNC_MAX_PERMANENT_FAILURES") {
            config.max_permanent_failures =
                raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "LEARNSYNC_MAX_PERMANENT_FAILURES",
                    value: raw.clone(),
                })?;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() && !self.force_offline {
            return Err(ConfigError::MissingBaseUrl);
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            force_offline: self.force_offline,
            request_timeout: self.request_timeout,
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_permanent_failures: self.max_permanent_failures.max(1),
            request_timeout: self.request_timeout,
        }
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        }),
    }
}
