//! Configuration loading for the appcast CLI
//!
//! The CLI reads the library's [`UpdateConfig`] from TOML and lets command
//! line flags override individual values.
//!
//! # Configuration File Locations
//!
//! - Unix: `~/.config/appcast/appcast.toml`
//! - Windows: `%APPDATA%\appcast\appcast.toml`

use std::path::{Path, PathBuf};

use appcast::{SecurityMode, UpdateConfig, UpdateError};

const CONFIG_FILE_NAME: &str = "appcast.toml";
const STATE_FILE_NAME: &str = "state.json";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "appcast")
}

/// Get default configuration file path
pub fn default_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Get default path of the persisted update state
pub fn default_state_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join(STATE_FILE_NAME))
}

/// Load configuration from default location
pub fn load_default() -> Result<UpdateConfig, UpdateError> {
    if let Some(path) = default_path() {
        if path.exists() {
            return UpdateConfig::load_from_file(&path);
        }
    }
    Ok(UpdateConfig::default())
}

/// Load configuration from custom path or default
///
/// A custom path must exist; the default path may be missing.
pub fn load_from(custom_path: Option<&Path>) -> Result<UpdateConfig, UpdateError> {
    match custom_path {
        Some(path) => UpdateConfig::load_from_file(path),
        None => load_default(),
    }
}

/// Values given on the command line that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// App cast location
    pub appcast_url: Option<String>,
    /// Channels to search besides stable
    pub channels: Vec<String>,
    /// Security mode
    pub mode: Option<SecurityMode>,
    /// Pinned public key
    pub public_key: Option<String>,
    /// Offer items for every operating system
    pub all_platforms: bool,
}

/// Apply CLI overrides to a loaded config
pub fn with_overrides(mut config: UpdateConfig, overrides: &CliOverrides) -> UpdateConfig {
    if let Some(url) = &overrides.appcast_url {
        config.appcast_url = Some(url.clone());
    }
    if !overrides.channels.is_empty() {
        config.channel.search_names = overrides.channels.clone();
    }
    if let Some(mode) = overrides.mode {
        config.security.mode = mode;
    }
    if let Some(key) = &overrides.public_key {
        // An inline key replaces a configured key file.
        config.security.public_key = Some(key.clone());
        config.security.public_key_file = None;
    }
    if overrides.all_platforms {
        config.filter_by_os = false;
    }
    config
}
