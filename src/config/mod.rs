//! Configuration management for splitpath.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rate::SamplerConfig;
use crate::split::SplitConfig;

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Weight decay law.
    #[serde(default)]
    pub split: SplitConfig,

    /// Rate sampler.
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Table locking.
    #[serde(default)]
    pub locks: LockConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load from `path`, or from [`default_path`](Self::default_path) when
    /// none is given. A missing file yields the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        match Self::load(&path) {
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.split.validate()?;

        self.sampler.validate()?;
        self.logging.validate()?;

        if self.locks.acquire_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidConfig(
                "locks.acquire_timeout must be greater than zero when set".into(),
            ));
        }

        Ok(())
    }

    /// Get default config path.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "splitpath", "splitpath").map_or_else(
            || PathBuf::from("splitpath.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }

    /// Create example configuration.
    pub fn example() -> Self {
        Self {
            locks: LockConfig {
                acquire_timeout: Some(Duration::from_millis(500)),
            },
            logging: LoggingConfig {
                level: "debug".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Table locking configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long to wait for a table lock before failing the operation.
    /// Unset means wait indefinitely.
    #[serde(default, with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> LogFormat {
    LogFormat::Text
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_color(),
        }
    }
}

impl LoggingConfig {
    /// Check that `level` is a valid filter directive.
    pub fn validate(&self) -> Result<()> {
        self.filter().map(|_| ())
    }

    fn filter(&self) -> Result<tracing_subscriber::EnvFilter> {
        tracing_subscriber::EnvFilter::try_new(&self.level).map_err(|e| {
            Error::InvalidConfig(format!("logging.level {:?} is not a filter: {e}", self.level))
        })
    }
}

/// Install the global `tracing` subscriber.
///
/// Fails when a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => config.filter()?,
    };
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Text => registry.with(fmt::layer().with_ansi(config.color)).try_init(),
    };
    installed.map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;

    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialised");
    Ok(())
}
