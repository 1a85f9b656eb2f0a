use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::events::DEFAULT_BUFFER;
use crate::names::HashAlgorithm;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config directory")]
    NoConfigDir,

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Which bus to connect to
    #[serde(default)]
    pub bus: BusConfig,

    /// Event stream settings
    #[serde(default)]
    pub events: EventsConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Defaults applied by the CLI to new transfers
    #[serde(default)]
    pub transfer: TransferDefaults,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    /// Per-user session bus, where the daemon normally runs
    #[default]
    Session,
    System,
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusKind::Session => f.write_str("session"),
            BusKind::System => f.write_str("system"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BusConfig {
    #[serde(default)]
    pub kind: BusKind,

    /// Explicit bus address, e.g. "unix:path=/run/user/1000/bus".
    /// Overrides `kind` when set.
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EventsConfig {
    /// Undelivered events buffered per stream before the adapter waits
    #[serde(default = "default_event_buffer")]
    pub buffer: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            buffer: default_event_buffer(),
        }
    }
}

fn default_event_buffer() -> usize {
    DEFAULT_BUFFER
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
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

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferDefaults {
    /// Bytes per second for new downloads, 0 = unlimited
    #[serde(default)]
    pub throttle: u64,

    /// Allow downloads over mobile data
    #[serde(default)]
    pub allow_mobile_data: bool,

    /// Digest assumed when `--hash` is given without `--algorithm`
    #[serde(default = "default_algorithm")]
    pub algorithm: HashAlgorithm,
}

impl Default for TransferDefaults {
    fn default() -> Self {
        Self {
            throttle: 0,
            allow_mobile_data: false,
            algorithm: default_algorithm(),
        }
    }
}

fn default_algorithm() -> HashAlgorithm {
    HashAlgorithm::Sha256
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("com", "canonical", "udm")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from file, or create default if not exists
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.events.buffer == 0 {
            return Err(ConfigError::ValidationError(
                "events.buffer must be at least 1".into(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level '{}' is not one of trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        if let Some(ref address) = self.bus.address {
            // D-Bus addresses are "transport:key=value,..."
            if !address.contains(':') {
                return Err(ConfigError::ValidationError(format!(
                    "bus.address '{}' has no transport prefix",
                    address
                )));
            }
        }

        Ok(())
    }

    /// Save config to file
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;

        info!("Config saved to: {}", path.display());
        Ok(())
    }
}

/// Show current configuration
pub fn show() -> anyhow::Result<()> {
    let config = Config::load()?;
    let path = Config::config_path()?;

    println!("Config file: {}\n", path.display());
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

/// Update configuration
pub fn update(
    throttle: Option<u64>,
    allow_mobile_data: Option<bool>,
    algorithm: Option<HashAlgorithm>,
    log_level: Option<String>,
) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    let mut changed = false;

    if let Some(t) = throttle {
        config.transfer.throttle = t;
        changed = true;
    }

    if let Some(allowed) = allow_mobile_data {
        config.transfer.allow_mobile_data = allowed;
        changed = true;
    }

    if let Some(a) = algorithm {
        config.transfer.algorithm = a;
        changed = true;
    }

    if let Some(level) = log_level {
        config.logging.level = level;
        changed = true;
    }

    if changed {
        config.validate()?;
        config.save()?;
        println!("Configuration updated.");
    } else {
        println!("No changes specified. Use --help to see options.");
    }

    Ok(())
}
