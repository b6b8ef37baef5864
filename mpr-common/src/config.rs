//! Configuration file discovery and TOML loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Config file name inside the per-user / system config directories
const CONFIG_FILE_NAME: &str = "config.toml";

/// Application directory name under the platform config dir
const APP_DIR: &str = "mpr";

/// Locate the configuration file following this priority order:
/// 1. Command-line argument (highest priority, must exist)
/// 2. Environment variable (must exist)
/// 3. Per-user config dir (`~/.config/mpr/config.toml` on Linux)
/// 4. System-wide `/etc/mpr/config.toml` (Linux only)
///
/// Returns `Ok(None)` when nothing was requested and no default file exists,
/// in which case callers run on built-in defaults.
pub fn resolve_config_file(cli_arg: Option<&Path>, env_var_name: &str) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return require_existing(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return require_existing(PathBuf::from(path));
        }
    }

    // Priority 3/4: platform defaults
    for candidate in default_config_paths() {
        if candidate.exists() {
            debug!("Using config file {}", candidate.display());
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

/// Default config file locations for the platform, most specific first
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(APP_DIR).join(CONFIG_FILE_NAME));
    }
    if cfg!(target_os = "linux") {
        paths.push(PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE_NAME));
    }
    paths
}

/// Load a TOML file into `T`, or `T::default()` when `path` is `None`
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    let text = std::fs::read_to_string(path)?;
    let value = toml::from_str(&text)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(value)
}

fn require_existing(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!("Config file not found: {}", path.display())))
    }
}
