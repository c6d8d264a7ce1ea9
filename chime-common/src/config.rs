//! Configuration file discovery and loading
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file (`~/.config/chime/config.toml` or platform equivalent)
//! 4. System config file (`/etc/chime/config.toml`, Linux only)
//!
//! When no file is found, or the file cannot be read, callers get compiled
//! defaults and a warning. Only a file that exists but fails to parse is an
//! error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Application directory name used under the platform config/cache dirs
pub const APP_DIR: &str = "chime";

/// Config file name searched for in the config directories
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CHIME_CONFIG";

/// Resolve which config file to load, if any.
///
/// Returns `None` when neither an explicit path nor a well-known file exists.
/// An explicit path (CLI or environment) is returned even if it does not
/// exist so that the loader can warn about it.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3/4: well-known locations
    default_config_path()
}

/// First existing well-known config file for the platform
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE_NAME));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Default directory for cached files
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR))
}

/// Load a TOML config, degrading to defaults when the file is unavailable.
///
/// - `None` path: compiled defaults
/// - Missing or unreadable file: warning + compiled defaults
/// - Unparseable file: `Error::Toml`
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        debug!("No config file found, using compiled defaults");
        return Ok(T::default());
    };

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(
                "Config file {} could not be read ({}), using compiled defaults",
                path.display(),
                e
            );
            return Ok(T::default());
        }
    };

    let config = parse_toml(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse TOML text into a config struct
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(toml::from_str(content)?)
}

/// Validate that a numeric setting is at least `min`
pub fn require_at_least(name: &str, value: u64, min: u64) -> Result<u64> {
    if value < min {
        return Err(Error::Config(format!(
            "{} must be at least {} (got {})",
            name, min, value
        )));
    }
    Ok(value)
}
