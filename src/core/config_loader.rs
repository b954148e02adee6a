//! # Config Loader
//!
//! Loads the optional `config.toml` holding default run settings. Every key is optional;
//! command-line flags always take precedence over the file.

use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILENAME};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at '{0}'.")]
    NotFound(String),
    #[error("Could not read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Error parsing TOML in '{path}': {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value for '{key}' in '{path}': {reason}")]
    InvalidValue {
        path: String,
        key: &'static str,
        reason: &'static str,
    },
}

/// Run settings read from the configuration file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub threads: Option<usize>,
    /// Per-command timeout, in seconds.
    pub timeout: Option<u64>,
    /// Shell command lines are handed to, e.g. `"bash -c"`.
    pub shell: Option<String>,
    pub no_cidr: bool,
    pub no_bar: bool,
    pub no_color: bool,
    pub verbose: bool,
    pub silent: bool,
}

/// Returns `<config_dir>/interweave/config.toml`, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILENAME))
}

/// Loads the configuration from `explicit` (tilde-expanded) or from the default location.
///
/// A missing default file yields the default configuration; a missing explicit file is an error.
pub fn load_config(explicit: Option<&str>) -> Result<FileConfig, ConfigError> {
    if let Some(raw) = explicit {
        let path = PathBuf::from(shellexpand::tilde(raw).as_ref());
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        return read_config(&path);
    }

    match default_config_path() {
        Some(path) if path.is_file() => read_config(&path),
        Some(path) => {
            log::debug!("No configuration file at '{}'; using defaults.", path.display());
            Ok(FileConfig::default())
        }
        None => {
            log::debug!("Could not find system config directory; using defaults.");
            Ok(FileConfig::default())
        }
    }
}

/// Reads and validates one configuration file.
pub fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let display = || path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display(),
        source,
    })?;
    let config: FileConfig = toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: display(),
        source,
    })?;

    if config.threads == Some(0) {
        return Err(ConfigError::InvalidValue {
            path: display(),
            key: "threads",
            reason: "must be a positive integer",
        });
    }
    if config.timeout == Some(0) {
        return Err(ConfigError::InvalidValue {
            path: display(),
            key: "timeout",
            reason: "must be a positive number of seconds",
        });
    }

    log::debug!("Loaded configuration from '{}'.", path.display());
    Ok(config)
}
