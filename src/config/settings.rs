//! # Lifecycle Settings
//!
//! Tunables for the refresh protocol, the rotation loop and logging.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Error, Result};

/// Prefix of every environment variable read by [`LifecycleSettings::from_env`].
pub const ENV_PREFIX: &str = "MTLS_LIFECYCLE";

/// Settings for a [`CertificateManager`](crate::lifecycle::CertificateManager).
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct LifecycleSettings {
    /// Rotate once `1 / refresh_rate` of the validity remains (2 = half-life)
    #[validate(range(min = 1, message = "Refresh rate must be at least 1"))]
    pub refresh_rate: u32,

    /// Upper bound on a single bounded refresh, in milliseconds
    #[validate(range(min = 1, message = "Refresh timeout must be positive"))]
    pub refresh_timeout_ms: u64,

    /// Attempts per refresh when the provider keeps reporting retriable failures
    #[validate(range(
        min = 1,
        max = 10,
        message = "Max refresh attempts must be between 1 and 10"
    ))]
    pub max_refresh_attempts: u32,

    /// Delay between rotation ticks when the last tick did not fail
    #[validate(range(min = 1, message = "Rotation interval must be positive"))]
    pub rotation_interval_ms: u64,

    #[validate(nested)]
    pub backoff: BackoffSettings,

    #[validate(nested)]
    pub logging: LoggingSettings,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            refresh_rate: 2,
            refresh_timeout_ms: 5_000,
            max_refresh_attempts: 3,
            rotation_interval_ms: 5_000,
            backoff: BackoffSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl LifecycleSettings {
    /// Load settings from `MTLS_LIFECYCLE_*` environment variables.
    ///
    /// Nested keys use `__`, e.g. `MTLS_LIFECYCLE_BACKOFF__INITIAL_MS`.
    pub fn from_env() -> Result<Self> {
        Self::load(None, Self::environment())
    }

    /// Load settings from a TOML/YAML/JSON file, with the environment layered on top.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::load(Some(path), Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Self = builder.add_source(environment).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate field ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if self.backoff.initial_ms > self.backoff.max_ms {
            return Err(Error::config("Backoff initial delay cannot exceed the maximum delay"));
        }
        Ok(())
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_millis(self.rotation_interval_ms)
    }
}

/// Backoff applied by the rotation loop after a failed tick
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct BackoffSettings {
    #[validate(range(min = 1, message = "Initial backoff must be positive"))]
    pub initial_ms: u64,

    pub max_ms: u64,

    #[validate(range(min = 1.0, max = 10.0, message = "Multiplier must be between 1 and 10"))]
    pub multiplier: f64,

    /// Draw each delay uniformly from `[0, computed]`
    pub jitter: bool,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self { initial_ms: 1_000, max_ms: 60_000, multiplier: 2.0, jitter: false }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is not set
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
