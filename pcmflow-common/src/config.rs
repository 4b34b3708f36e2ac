//! Configuration loading and validation
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (applied by the binary as overrides)
//! 2. Environment variables (handled by clap `env` on the same arguments)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! A missing TOML file is never fatal: a warning is logged and defaults apply.
//! A TOML file that exists but cannot be parsed is a configuration error.

use crate::{Error, Result, SampleEncoding};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PCMFLOW_CONFIG";

/// Playback buffer configuration
///
/// Supplied once when the player is constructed. Every field has a default,
/// so a partial `[player]` table is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Encoding of incoming chunks
    pub encoding: SampleEncoding,

    /// Interleaved channel count (>= 1)
    pub channels: u16,

    /// Sample rate in Hz (> 0)
    pub sample_rate: u32,

    /// Period of the flush timer in milliseconds (> 0)
    pub flush_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            encoding: SampleEncoding::I16,
            channels: 1,
            sample_rate: 8000,
            flush_interval_ms: 1000,
        }
    }
}

impl PlayerConfig {
    /// Reject configurations the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(Error::Config("channels must be at least 1".to_string()));
        }
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be greater than 0".to_string()));
        }
        if self.flush_interval_ms == 0 {
            return Err(Error::Config(
                "flush_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Flush timer period
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Audio output device settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output device name (None = system default)
    pub device: Option<String>,

    /// Device buffer size in frames (None = device default)
    pub buffer_size: Option<u32>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
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

/// Complete configuration file layout
///
/// ```toml
/// [player]
/// encoding = "i16"
/// channels = 2
/// sample_rate = 48000
/// flush_interval_ms = 250
///
/// [output]
/// device = "pulse"
///
/// [logging]
/// level = "debug"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub player: PlayerConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Player settings are not validated here; command-line overrides are
    /// applied first and the merged [`PlayerConfig`] is validated by the caller.
    ///
    /// # Errors
    /// I/O errors reading the file and parse errors.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve and load the configuration file, falling back to defaults
    ///
    /// Missing files produce a warning and the built-in defaults. A file
    /// that exists but is malformed is still an error.
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                debug!("No config file location available, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Locate the configuration file
///
/// Priority: explicit path, then `PCMFLOW_CONFIG`, then
/// `<platform config dir>/pcmflow/config.toml`.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir().map(|d| d.join("pcmflow").join("config.toml"))
}
