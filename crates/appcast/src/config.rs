//! Configuration for the update client.
//!
//! Two layers:
//! - [`UpdateConfig`]: static settings loaded from TOML (where to look, which
//!   channels, how strictly to verify)
//! - [`Configuration`]: the host application's live state (installed version,
//!   skipped version, last check time), read once per check as a
//!   [`ConfigSnapshot`]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::CodecKind;
use crate::download::{default_user_agent, DownloaderConfig};
use crate::error::UpdateError;
use crate::filter::ChannelFilter;
use crate::signature::{Ed25519Verifier, SecurityMode};
use crate::version::SemVerLike;

/// Main update configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// App cast location (`https://`, `file://` or a path)
    #[serde(default)]
    pub appcast_url: Option<String>,

    /// App cast wire format
    #[serde(default)]
    pub format: ManifestFormat,

    /// Only offer items built for the running operating system
    #[serde(default = "default_true")]
    pub filter_by_os: bool,

    /// Interval between automatic update checks in hours
    #[serde(default = "default_check_interval")]
    pub check_interval_hours: u32,

    /// Channel selection
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Security configuration
    #[serde(default)]
    pub security: SecurityConfig,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            appcast_url: None,
            format: ManifestFormat::default(),
            filter_by_os: true,
            check_interval_hours: default_check_interval(),
            channel: ChannelConfig::default(),
            security: SecurityConfig::default(),
            network: NetworkConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl UpdateConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, UpdateError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| UpdateError::ConfigError(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), UpdateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| UpdateError::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Interval between automatic checks.
    pub fn check_interval(&self) -> Duration {
        Duration::hours(i64::from(self.check_interval_hours))
    }
}

/// Which codec reads the app cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    /// Decide from the document's first byte
    #[default]
    Auto,
    Xml,
    Json,
}

impl ManifestFormat {
    /// Codec kind for a downloaded document.
    pub fn resolve(self, data: &[u8]) -> CodecKind {
        match self {
            Self::Auto => CodecKind::sniff(data),
            Self::Xml => CodecKind::Xml,
            Self::Json => CodecKind::Json,
        }
    }
}

impl From<CodecKind> for ManifestFormat {
    fn from(kind: CodecKind) -> Self {
        match kind {
            CodecKind::Xml => Self::Xml,
            CodecKind::Json => Self::Json,
        }
    }
}

/// Channel selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Pre-release channels to offer besides stable (e.g. `["beta"]`)
    #[serde(default)]
    pub search_names: Vec<String>,

    /// Drop items not newer than the installed version
    #[serde(default = "default_true")]
    pub remove_older_items: bool,

    /// Keep pre-release items whose channel was not searched for
    #[serde(default)]
    pub keep_items_with_no_channel_info: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            search_names: Vec::new(),
            remove_older_items: true,
            keep_items_with_no_channel_info: false,
        }
    }
}

impl ChannelConfig {
    /// Channel filter for these settings.
    pub fn to_filter(&self) -> ChannelFilter {
        ChannelFilter::new(self.search_names.iter().cloned())
            .remove_older_items(self.remove_older_items)
            .keep_items_with_no_channel_info(self.keep_items_with_no_channel_info)
    }
}

/// Security configuration for signature verification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Policy for missing keys and signatures
    #[serde(default)]
    pub mode: SecurityMode,

    /// Pinned public key
    /// Format: "ed25519:<hex_or_base64_public_key>"
    #[serde(default)]
    pub public_key: Option<String>,

    /// File holding the public key; takes precedence over `public_key`
    #[serde(default)]
    pub public_key_file: Option<PathBuf>,
}

impl SecurityConfig {
    /// Build the verifier for these settings.
    pub fn verifier(&self) -> Result<Ed25519Verifier, UpdateError> {
        match &self.public_key_file {
            Some(path) => Ed25519Verifier::from_key_file(self.mode, path),
            None => Ok(Ed25519Verifier::new(self.mode, self.public_key.as_deref())),
        }
    }
}

/// Network configuration for downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Read timeout in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,

    /// User agent (empty = `appcast/<version>`)
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            read_timeout_seconds: default_read_timeout(),
            user_agent: None,
        }
    }
}

impl NetworkConfig {
    /// Settings for [`HttpDownloader`](crate::download::HttpDownloader).
    pub fn downloader_config(&self) -> DownloaderConfig {
        DownloaderConfig {
            timeout_secs: self.timeout_seconds,
            read_timeout_secs: self.read_timeout_seconds,
            user_agent: self
                .user_agent
                .clone()
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or_else(default_user_agent),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
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

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_check_interval() -> u32 {
    24 // Daily
}

fn default_timeout() -> u64 {
    crate::download::DEFAULT_TIMEOUT_SECS
}

fn default_read_timeout() -> u64 {
    crate::download::DEFAULT_READ_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Host application state as seen by one update check.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    /// Currently installed version
    pub installed_version: SemVerLike,
    /// Name of the application being updated
    pub application_identity: String,
    /// Version the user chose to skip
    pub skip_this_version: Option<String>,
    /// When the last check completed
    pub last_check_time: Option<DateTime<Utc>>,
}

/// Live state of the host application.
///
/// Setters take `&self` so one instance can be shared with the resolver.
pub trait Configuration: Send + Sync {
    /// Currently installed version.
    fn installed_version(&self) -> SemVerLike;

    /// Name of the application being updated.
    fn application_identity(&self) -> String;

    /// Version the user chose to skip.
    fn skip_this_version(&self) -> Option<String>;

    /// When the last check completed.
    fn last_check_time(&self) -> Option<DateTime<Utc>>;

    /// Remember (or clear) a version to skip.
    fn set_version_to_skip(&self, version: Option<&str>) -> Result<(), UpdateError>;

    /// Record when a check completed.
    fn set_last_check_time(&self, time: DateTime<Utc>) -> Result<(), UpdateError>;

    /// Read every field once.
    fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            installed_version: self.installed_version(),
            application_identity: self.application_identity(),
            skip_this_version: self.skip_this_version(),
            last_check_time: self.last_check_time(),
        }
    }
}

/// Mutable part of the host state, persisted by [`FileConfiguration`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateState {
    /// Version the user chose to skip
    #[serde(default)]
    pub skip_this_version: Option<String>,
    /// When the last check completed
    #[serde(default)]
    pub last_check_time: Option<DateTime<Utc>>,
}

impl UpdateState {
    fn set_skip(&mut self, version: Option<&str>) {
        self.skip_this_version = version
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
    }
}

/// [`Configuration`] held entirely in memory.
#[derive(Debug)]
pub struct InMemoryConfiguration {
    application_identity: String,
    installed_version: SemVerLike,
    state: Mutex<UpdateState>,
}

impl InMemoryConfiguration {
    pub fn new(application_identity: impl Into<String>, installed_version: &str) -> Self {
        Self {
            application_identity: application_identity.into(),
            installed_version: SemVerLike::parse(installed_version),
            state: Mutex::new(UpdateState::default()),
        }
    }

    /// Builder-style skipped version.
    pub fn with_skipped_version(self, version: &str) -> Self {
        self.lock().set_skip(Some(version));
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UpdateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Configuration for InMemoryConfiguration {
    fn installed_version(&self) -> SemVerLike {
        self.installed_version.clone()
    }

    fn application_identity(&self) -> String {
        self.application_identity.clone()
    }

    fn skip_this_version(&self) -> Option<String> {
        self.lock().skip_this_version.clone()
    }

    fn last_check_time(&self) -> Option<DateTime<Utc>> {
        self.lock().last_check_time
    }

    fn set_version_to_skip(&self, version: Option<&str>) -> Result<(), UpdateError> {
        self.lock().set_skip(version);
        Ok(())
    }

    fn set_last_check_time(&self, time: DateTime<Utc>) -> Result<(), UpdateError> {
        self.lock().last_check_time = Some(time);
        Ok(())
    }
}

/// [`Configuration`] whose mutable state lives in a JSON file.
///
/// Every setter writes the file immediately.
#[derive(Debug)]
pub struct FileConfiguration {
    application_identity: String,
    installed_version: SemVerLike,
    state_path: PathBuf,
    state: Mutex<UpdateState>,
}

impl FileConfiguration {
    /// Load state from `state_path`, starting empty if the file does not exist.
    pub fn load(
        state_path: PathBuf,
        application_identity: impl Into<String>,
        installed_version: &str,
    ) -> Result<Self, UpdateError> {
        let state = if state_path.exists() {
            let content = std::fs::read_to_string(&state_path)?;
            let state: UpdateState = serde_json::from_str(&content)?;
            tracing::debug!(path = ?state_path, "Loaded update state");
            state
        } else {
            tracing::debug!(path = ?state_path, "No update state found, starting fresh");
            UpdateState::default()
        };

        Ok(Self {
            application_identity: application_identity.into(),
            installed_version: SemVerLike::parse(installed_version),
            state_path,
            state: Mutex::new(state),
        })
    }

    /// Path of the state file.
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    fn update(&self, change: impl FnOnce(&mut UpdateState)) -> Result<(), UpdateError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        change(&mut state);

        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&*state)?;
        std::fs::write(&self.state_path, content)?;
        tracing::debug!(path = ?self.state_path, "Saved update state");
        Ok(())
    }

    fn read(&self) -> UpdateState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Configuration for FileConfiguration {
    fn installed_version(&self) -> SemVerLike {
        self.installed_version.clone()
    }

    fn application_identity(&self) -> String {
        self.application_identity.clone()
    }

    fn skip_this_version(&self) -> Option<String> {
        self.read().skip_this_version
    }

    fn last_check_time(&self) -> Option<DateTime<Utc>> {
        self.read().last_check_time
    }

    fn set_version_to_skip(&self, version: Option<&str>) -> Result<(), UpdateError> {
        self.update(|state| state.set_skip(version))
    }

    fn set_last_check_time(&self, time: DateTime<Utc>) -> Result<(), UpdateError> {
        self.update(|state| state.last_check_time = Some(time))
    }
}

/// Whether a new check is due, measured from the last recorded check.
///
/// Never-checked and future-dated (clock skew) states are always due.
pub fn is_check_due(snapshot: &ConfigSnapshot, interval: Duration) -> bool {
    is_check_due_at(snapshot, interval, Utc::now())
}

/// [`is_check_due`] against an explicit clock.
pub fn is_check_due_at(snapshot: &ConfigSnapshot, interval: Duration, now: DateTime<Utc>) -> bool {
    match snapshot.last_check_time {
        None => true,
        Some(last) if last > now => true,
        Some(last) => now - last >= interval,
    }
}
