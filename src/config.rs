use crate::stats::DEFAULT_WORDS_PER_MINUTE;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Longest quiet period accepted for the debounce gate.
const MAX_DEBOUNCE_MS: u64 = 60_000;

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

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Stats engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for one stats engine instance.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Reading speed used for the reading-time estimate
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,

    /// Quiet period before a computation is dispatched (milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Compute on a background thread (disable where threads are unavailable)
    #[serde(default = "default_true")]
    pub use_worker: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            words_per_minute: default_words_per_minute(),
            debounce_ms: default_debounce_ms(),
            use_worker: true,
        }
    }
}

impl EngineConfig {
    /// Debounce interval as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Validate engine values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.words_per_minute == 0 {
            return Err(ConfigError::ValidationError(
                "words_per_minute must be positive".into(),
            ));
        }

        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::ValidationError(format!(
                "debounce_ms cannot exceed {} ms",
                MAX_DEBOUNCE_MS
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
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

fn default_words_per_minute() -> u32 {
    DEFAULT_WORDS_PER_MINUTE
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("com", "textpulse", "textpulse")
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
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load and validate config from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;

        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    /// Save config to a specific file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Create config directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        info!("Config saved to: {}", path.display());
        Ok(())
    }
}

/// Show current configuration
pub fn show(path: Option<&Path>) -> anyhow::Result<()> {
    let (config, path) = match path {
        Some(p) if p.exists() => (Config::load_from(p)?, p.to_path_buf()),
        Some(p) => (Config::default(), p.to_path_buf()),
        None => (Config::load()?, Config::config_path()?),
    };

    println!("Config file: {}\n", path.display());
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

/// Update configuration
pub fn update(
    path: Option<&Path>,
    words_per_minute: Option<u32>,
    debounce_ms: Option<u64>,
    worker: Option<String>,
) -> anyhow::Result<()> {
    let mut config = match path {
        Some(p) if p.exists() => Config::load_from(p)?,
        Some(_) => Config::default(),
        None => Config::load()?,
    };
    let mut changed = false;

    if let Some(wpm) = words_per_minute {
        config.engine.words_per_minute = wpm;
        changed = true;
    }

    if let Some(ms) = debounce_ms {
        config.engine.debounce_ms = ms;
        changed = true;
    }

    if let Some(worker) = worker {
        config.engine.use_worker = match worker.to_lowercase().as_str() {
            "on" | "true" | "yes" => true,
            "off" | "false" | "no" => false,
            _ => {
                return Err(anyhow::anyhow!(
                    "Unknown worker setting '{}'. Use 'on' or 'off'.",
                    worker
                ));
            }
        };
        changed = true;
    }

    if changed {
        config.validate()?;
        match path {
            Some(p) => config.save_to(p)?,
            None => config.save()?,
        }
        println!("Configuration updated.");
    } else {
        println!("No changes specified. Use --show to view current config.");
    }

    Ok(())
}
