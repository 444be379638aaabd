use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PROGRAM_NAME: &str = "courier";
pub const PROGRAM_LOG_LEVEL: &str = "COURIER_LOG_LEVEL";
pub const PROGRAM_LOG_FILE: &str = "COURIER_LOG_FILE";
pub const PROGRAM_CONFIG: &str = "COURIER_CONFIG";
pub const CONFIG_FILE_NAME: &str = "loader.json";

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_LOG_INTERVAL: usize = 50_000;
pub const DEFAULT_RETRY_BUDGET: u32 = 5;
pub const DEFAULT_MIN_WORKERS: usize = 5;
pub const DEFAULT_MAX_WORKERS: usize = 10;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_GRACEFUL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_FORCED_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Worker pool shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Workers spawned up front and never retired
    pub min_workers: usize,
    /// Upper bound on workers spawned on demand while the queue is full
    pub max_workers: usize,
    /// Pending batches the queue holds before `submit` blocks
    pub queue_capacity: usize,
    /// Idle time after which a worker above `min_workers` retires
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: DEFAULT_MIN_WORKERS,
            max_workers: DEFAULT_MAX_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Escalating wait windows used when the pool is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShutdownConfig {
    pub graceful_timeout_secs: u64,
    pub forced_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout_secs: DEFAULT_GRACEFUL_TIMEOUT_SECS,
            forced_timeout_secs: DEFAULT_FORCED_TIMEOUT_SECS,
        }
    }
}

impl ShutdownConfig {
    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_timeout_secs)
    }

    pub fn forced_timeout(&self) -> Duration {
        Duration::from_secs(self.forced_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Every tunable the loader consumes. Missing fields fall back to the defaults above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// Records between two progress lines; 0 disables them
    pub log_interval: usize,
    /// Delivery attempts per record on transport failures
    pub retry_budget: u32,
    pub pool: PoolConfig,
    pub shutdown: ShutdownConfig,
    pub http: HttpConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            log_interval: DEFAULT_LOG_INTERVAL,
            retry_budget: DEFAULT_RETRY_BUDGET,
            pool: PoolConfig::default(),
            shutdown: ShutdownConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl LoaderConfig {
    pub fn from_json_str(s: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw, path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.retry_budget == 0 {
            return Err(ConfigError::Invalid(
                "retry_budget must be at least 1".into(),
            ));
        }
        if self.pool.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pool.queue_capacity must be at least 1".into(),
            ));
        }
        if self.pool.max_workers == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_workers must be at least 1".into(),
            ));
        }
        if self.pool.min_workers > self.pool.max_workers {
            return Err(ConfigError::Invalid(format!(
                "pool.min_workers ({}) exceeds pool.max_workers ({})",
                self.pool.min_workers, self.pool.max_workers
            )));
        }
        Ok(())
    }
}

/// Default location of the config file, e.g. `~/.config/courier/loader.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(PROGRAM_NAME).join(CONFIG_FILE_NAME))
}

/// Resolve and read the effective config.
///
/// An explicit path must exist. Otherwise `COURIER_CONFIG` is consulted, then the
/// default location; when neither points at a file the built-in defaults apply.
pub fn load_config(explicit: Option<&Path>) -> Result<LoaderConfig, ConfigError> {
    if let Some(path) = explicit {
        return LoaderConfig::from_file(path);
    }

    if let Some(path) = std::env::var_os(PROGRAM_CONFIG)
        && !path.is_empty()
    {
        return LoaderConfig::from_file(Path::new(&path));
    }

    match default_config_path() {
        Some(path) if path.is_file() => LoaderConfig::from_file(&path),
        _ => {
            debug!("no config file found; using built-in defaults");
            Ok(LoaderConfig::default())
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
