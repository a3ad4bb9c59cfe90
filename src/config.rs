//! Host configuration: optional JSON file, then environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "PAIRLINE_CONFIG_PATH";
pub const DATA_DIR_ENV: &str = "PAIRLINE_DATA_DIR";
pub const WORKSPACE_ID_ENV: &str = "PAIRLINE_WORKSPACE_ID";
pub const RUNTIME_ENV: &str = "PAIRLINE_RUNTIME";
pub const REQUEST_TIMEOUT_ENV: &str = "PAIRLINE_REQUEST_TIMEOUT_SEC";
pub const LOG_FILTER_ENV: &str = "PAIRLINE_LOG";
pub const LOG_JSON_ENV: &str = "PAIRLINE_LOG_JSON";

const DEFAULT_DATA_DIR: &str = ".pairline";
const DEFAULT_WORKSPACE_ID: &str = "default";
const DEFAULT_RUNTIME_ID: &str = "mock";
const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 120;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// On-disk shape. Every field is optional; unknown fields are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub workspace_id: Option<String>,
    pub runtime: Option<String>,
    pub request_timeout_sec: Option<u64>,
    pub mock_step_delay_ms: Option<u64>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            filter: env_string_opt(LOG_FILTER_ENV)
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            json: env_flag(LOG_JSON_ENV),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub workspace_id: String,
    pub runtime_id: String,
    pub request_timeout: Duration,
    pub mock_step_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            workspace_id: DEFAULT_WORKSPACE_ID.to_string(),
            runtime_id: DEFAULT_RUNTIME_ID.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SEC),
            mock_step_delay: Duration::ZERO,
        }
    }
}

impl Config {
    /// Loads `path` (or `PAIRLINE_CONFIG_PATH` when `path` is `None`) and
    /// applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env_string_opt(CONFIG_PATH_ENV).map(PathBuf::from));
        let file = match path {
            Some(path) => FileConfig::read(&path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file)
    }

    pub fn resolve(file: FileConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let data_dir = env_string_opt(DATA_DIR_ENV)
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or(defaults.data_dir);
        let workspace_id = env_string_opt(WORKSPACE_ID_ENV)
            .or(file.workspace_id)
            .unwrap_or(defaults.workspace_id);
        let runtime_id = env_string_opt(RUNTIME_ENV)
            .or(file.runtime)
            .map(|value| value.trim().to_string())
            .unwrap_or(defaults.runtime_id);

        let request_timeout_sec = match env_string_opt(REQUEST_TIMEOUT_ENV) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: REQUEST_TIMEOUT_ENV,
                    value,
                    reason: "expected a whole number of seconds",
                })?,
            None => file
                .request_timeout_sec
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SEC),
        };
        if request_timeout_sec == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_sec",
                value: request_timeout_sec.to_string(),
                reason: "must be greater than zero",
            });
        }

        if workspace_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "workspace_id",
                value: workspace_id,
                reason: "must not be blank",
            });
        }

        Ok(Self {
            data_dir,
            workspace_id,
            runtime_id,
            request_timeout: Duration::from_secs(request_timeout_sec),
            mock_step_delay: Duration::from_millis(file.mock_step_delay_ms.unwrap_or(0)),
        })
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
