mod config;
pub mod logging;

pub use config::{
    CONFIG_FILE_NAME, ConfigError, DEFAULT_BATCH_SIZE, DEFAULT_LOG_INTERVAL,
    DEFAULT_RETRY_BUDGET, HttpConfig, LoaderConfig, PROGRAM_CONFIG, PROGRAM_NAME, PoolConfig,
    ShutdownConfig, default_config_path, load_config,
};

pub use logging::init;
