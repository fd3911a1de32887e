//! Runtime configuration from environment variables (and an optional `.env`).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DATA_DIR_VAR: &str = "MINTYFLOW_DATA_DIR";
pub const PROFILE_API_URL_VAR: &str = "MINTYFLOW_PROFILE_API_URL";
pub const SYNC_API_URL_VAR: &str = "MINTYFLOW_SYNC_API_URL";
pub const API_TOKEN_VAR: &str = "MINTYFLOW_API_TOKEN";
pub const BOOTSTRAP_TIMEOUT_VAR: &str = "MINTYFLOW_BOOTSTRAP_TIMEOUT_SECS";
pub const OUTBOX_INTERVAL_VAR: &str = "MINTYFLOW_OUTBOX_INTERVAL_SECS";

const DEFAULT_BOOTSTRAP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_OUTBOX_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive number of seconds, got {value:?}")]
    InvalidSeconds { var: &'static str, value: String },

    #[error("no local data directory available; set MINTYFLOW_DATA_DIR")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub profile_api_url: Option<String>,
    pub sync_api_url: Option<String>,
    pub api_token: Option<String>,
    pub bootstrap_timeout: Duration,
    pub outbox_interval: Duration,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let data_dir = match get(DATA_DIR_VAR) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join("mintyflow"),
        };

        Ok(Self {
            data_dir,
            profile_api_url: get(PROFILE_API_URL_VAR),
            sync_api_url: get(SYNC_API_URL_VAR),
            api_token: get(API_TOKEN_VAR),
            bootstrap_timeout: seconds(
                BOOTSTRAP_TIMEOUT_VAR,
                get(BOOTSTRAP_TIMEOUT_VAR),
                DEFAULT_BOOTSTRAP_TIMEOUT_SECS,
            )?,
            outbox_interval: seconds(
                OUTBOX_INTERVAL_VAR,
                get(OUTBOX_INTERVAL_VAR),
                DEFAULT_OUTBOX_INTERVAL_SECS,
            )?,
        })
    }
}

fn seconds(var: &'static str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    let Some(value) = value else {
        return Ok(Duration::from_secs(default));
    };
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidSeconds { var, value }),
    }
}
