//! # Server Configuration
//!
//! Loaded once at startup from an optional file plus environment overrides,
//! then validated. Engine limits are one section, network and cron settings
//! their own.

use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use pkv_engine::EngineConfig;

const ENV_PREFIX: &str = "PKV";
const ENV_SEPARATOR: &str = "__";
const ENV_VAR_CONFIG_FILE: &str = "PKV_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./pkv.toml";

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file specified by `PKV_CONFIG` was not found.
    #[error("config file not found: {path:?}")]
    FileNotFound { path: PathBuf },

    /// Failed to parse the configuration file or environment variables.
    #[error("failed to parse config")]
    Parse(#[from] config::ConfigError),

    /// A validated field was out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,
    /// Connections accepted before new clients are turned away.
    pub max_clients: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            host: "127.0.0.1".to_string(),
            port: 10128,
            max_clients: 1024,
        }
    }
}

/// Engine limits, mirrored into [`EngineConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest accepted key; longer input truncates.
    pub max_key_size: usize,
    /// Longest accepted value; longer input truncates.
    pub max_value_size: usize,
    /// Ceiling applied to every item ttl, seconds.
    pub max_item_ttl: i64,
    /// Write gate in bytes.
    pub max_memory: u64,
    /// Compression threshold in bytes.
    pub compression: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        LimitsConfig {
            max_key_size: engine.max_key_size,
            max_value_size: engine.max_value_size,
            max_item_ttl: engine.max_item_ttl,
            max_memory: engine.max_memory,
            compression: engine.compression,
        }
    }
}

/// Periodic engine-clock refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    /// Tick period in milliseconds.
    pub period_ms: u64,
}

impl Default for CronConfig {
    fn default() -> Self {
        CronConfig { period_ms: 1000 }
    }
}

/// The aggregated server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub limits: LimitsConfig,
    pub cron: CronConfig,
}

impl Config {
    /// Loads configuration from the optional file and environment overrides,
    /// then validates it.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(config_file) = Self::find_config_file()? {
            info!(?config_file, "loading configuration file");
            builder = builder.add_source(config::File::from(config_file).required(true));
        } else {
            info!("no config file found, using defaults and environment variables");
        }

        builder = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR));

        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;

        debug!(
            host = %loaded.network.host,
            port = loaded.network.port,
            max_memory = loaded.limits.max_memory,
            cron_period_ms = loaded.cron.period_ms,
            "configuration loaded and validated"
        );

        Ok(loaded)
    }

    /// Range checks for the tunables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_key_size == 0 {
            return Err(ConfigError::Invalid("max_key_size must be positive".into()));
        }
        if self.limits.max_value_size == 0 {
            return Err(ConfigError::Invalid(
                "max_value_size must be positive".into(),
            ));
        }
        if self.limits.compression >= self.limits.max_value_size {
            return Err(ConfigError::Invalid(
                "compression threshold must be below max_value_size".into(),
            ));
        }
        if self.limits.max_memory == 0 {
            return Err(ConfigError::Invalid("max_memory must be positive".into()));
        }
        if self.cron.period_ms == 0 {
            return Err(ConfigError::Invalid("cron period must be positive".into()));
        }
        Ok(())
    }

    /// Engine view of the configured limits.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            max_key_size: self.limits.max_key_size,
            max_value_size: self.limits.max_value_size,
            max_item_ttl: self.limits.max_item_ttl,
            max_memory: self.limits.max_memory,
            compression: self.limits.compression,
        }
    }

    /// Bind address for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.network.host, self.network.port)
    }

    fn find_config_file() -> Result<Option<PathBuf>, ConfigError> {
        if let Ok(path) = env::var(ENV_VAR_CONFIG_FILE) {
            let path = PathBuf::from(path);
            return if path.exists() {
                Ok(Some(path))
            } else {
                Err(ConfigError::FileNotFound { path })
            };
        }

        let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Ok(Some(default_path));
        }

        Ok(None)
    }
}
