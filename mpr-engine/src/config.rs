//! Configuration for the mpr-engine player
//!
//! Loaded from TOML (see [`mpr_common::config::resolve_config_file`] for the
//! lookup order). Every field has a built-in default so an empty or missing
//! file is valid.
//!
//! ```toml
//! [output]
//! driver = "null"        # null | discard | wav | cpal
//! encoding = "s16"       # preferred output encoding
//!
//! [playback]
//! volume = 0.75
//! boost = false
//! rva_db = 0.0          # relative volume adjustment
//!
//! [radio]
//! chunk_size = 4096
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use crate::format::Encoding;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "MPR_CONFIG";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub output: OutputConfig,
    pub playback: PlaybackConfig,
    pub radio: RadioConfig,
    pub logging: LoggingConfig,
}

/// Output device selection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Driver name passed to the backend's `open_output`
    pub driver: String,
    /// Driver-specific device (device name, or file path for `wav`)
    pub device: Option<String>,
    /// Preferred encoding when the output supports it
    pub encoding: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            driver: "null".to_string(),
            device: None,
            encoding: "s16".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Initial linear volume
    pub volume: f64,
    /// Allow volume above 1.0 (up to 3.0)
    pub boost: bool,
    /// Feed cycles spent waiting for the first decodable radio frame
    pub radio_prime_cycles: u32,
    /// Relative volume adjustment in dB applied on top of the volume
    pub rva_db: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: 0.75,
            boost: false,
            radio_prime_cycles: 64,
            rva_db: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    /// Per-read timeout on the stream body
    pub read_timeout_secs: u64,
    /// Bytes per feed cycle for stations without ICY metadata
    pub chunk_size: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("mpr/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 15,
            chunk_size: 4096,
        }
    }
}

impl RadioConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl EngineConfig {
    /// Resolve, load and validate the configuration file
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = mpr_common::config::resolve_config_file(cli_path, CONFIG_ENV_VAR)?;
        let config: EngineConfig = mpr_common::config::load_toml(path.as_deref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if Encoding::from_name(&self.output.encoding).is_none() {
            return Err(Error::Config(format!(
                "output.encoding must be s16 or f32, got '{}'",
                self.output.encoding
            )));
        }
        if self.output.driver.trim().is_empty() {
            return Err(Error::Config("output.driver must not be empty".to_string()));
        }
        let max_volume = if self.playback.boost { 3.0 } else { 1.0 };
        if !(0.0..=max_volume).contains(&self.playback.volume) {
            return Err(Error::Config(format!(
                "playback.volume {} outside 0.0-{}",
                self.playback.volume, max_volume
            )));
        }
        if !(-60.0..=20.0).contains(&self.playback.rva_db) {
            return Err(Error::Config(format!(
                "playback.rva_db {} outside -60.0-20.0",
                self.playback.rva_db
            )));
        }
        if self.radio.chunk_size == 0 {
            return Err(Error::Config("radio.chunk_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Preferred output encoding (validated on load)
    pub fn preferred_encoding(&self) -> Encoding {
        Encoding::from_name(&self.output.encoding).unwrap_or(Encoding::SIGNED_16)
    }
}
