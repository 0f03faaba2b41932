//! Update resolver - runs one update check end to end.
//!
//! A check moves through these states:
//!
//! ```text
//! Idle -> Downloading -> Parsing -> Verifying -> Filtering -> Done(status)
//! ```
//!
//! Any failure along the way (transport, parse, app cast signature,
//! cancellation) ends the check in [`UpdateStatus::CouldNotDetermine`] with the
//! cause logged. Host state is read once per check as a
//! [`ConfigSnapshot`](crate::config::ConfigSnapshot).

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigSnapshot, Configuration, ManifestFormat, UpdateConfig};
use crate::download::{DataDownloader, HttpDownloader, LocalFileDownloader};
use crate::error::UpdateError;
use crate::filter::{ChannelFilter, ItemFilter};
use crate::item::{ManifestItem, OsFamily};
use crate::signature::{SignatureVerificationResult, SignatureVerifier};

/// Suffix appended to the app cast URL to locate its detached signature.
pub const APPCAST_SIGNATURE_SUFFIX: &str = ".signature";

/// Outcome of an update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// At least one newer item passed every filter
    UpdateAvailable,
    /// Nothing newer for this installation
    UpdateNotAvailable,
    /// The newest candidate is the version the user chose to skip
    UserSkipped,
    /// The app cast could not be fetched, parsed or trusted
    CouldNotDetermine,
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpdateAvailable => write!(f, "update available"),
            Self::UpdateNotAvailable => write!(f, "no update available"),
            Self::UserSkipped => write!(f, "skipped by user"),
            Self::CouldNotDetermine => write!(f, "could not determine"),
        }
    }
}

/// Result of an update check: status plus candidates, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCheck {
    pub status: UpdateStatus,
    pub items: Vec<ManifestItem>,
}

impl UpdateCheck {
    /// Check that produced no usable answer.
    pub fn could_not_determine() -> Self {
        Self {
            status: UpdateStatus::CouldNotDetermine,
            items: Vec::new(),
        }
    }

    /// Newest candidate.
    pub fn latest(&self) -> Option<&ManifestItem> {
        self.items.first()
    }

    /// Whether any candidate is marked critical.
    pub fn has_critical_update(&self) -> bool {
        self.items.iter().any(|item| item.is_critical)
    }
}

/// Where the resolver is in its current check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolverState {
    /// No check has run yet
    #[default]
    Idle,
    /// Fetching the app cast
    Downloading,
    /// Decoding the app cast
    Parsing,
    /// Checking the app cast signature
    Verifying,
    /// Narrowing items to candidates
    Filtering,
    /// Check finished
    Done(UpdateStatus),
}

/// Runs update checks against one app cast.
///
/// # Example
///
/// ```ignore
/// use appcast::resolver::UpdateResolver;
///
/// let resolver = UpdateResolver::from_config(&config, configuration)?;
/// let check = resolver.check_for_updates().await;
/// if let Some(latest) = check.latest() {
///     println!("Update available: {}", latest.version);
/// }
/// ```
pub struct UpdateResolver {
    /// App cast location
    appcast_url: String,
    /// Wire format or auto-detection
    format: ManifestFormat,
    /// Source of app cast and payload bytes
    downloader: Arc<dyn DataDownloader>,
    /// Signature policy and scheme
    verifier: Arc<dyn SignatureVerifier>,
    /// Host application state
    configuration: Arc<dyn Configuration>,
    /// Candidate selection
    filter: Arc<dyn ItemFilter>,
    /// Only keep items for this OS family
    os_filter: Option<OsFamily>,
    /// Current state
    state: Arc<RwLock<ResolverState>>,
    /// Aborts in-flight downloads
    cancel: CancellationToken,
}

impl UpdateResolver {
    /// Create a resolver with the default channel filter and OS filtering for
    /// the running platform.
    pub fn new(
        appcast_url: impl Into<String>,
        downloader: Arc<dyn DataDownloader>,
        verifier: Arc<dyn SignatureVerifier>,
        configuration: Arc<dyn Configuration>,
    ) -> Self {
        Self {
            appcast_url: appcast_url.into(),
            format: ManifestFormat::Auto,
            downloader,
            verifier,
            configuration,
            filter: Arc::new(ChannelFilter::default()),
            os_filter: Some(OsFamily::current()),
            state: Arc::new(RwLock::new(ResolverState::Idle)),
            cancel: CancellationToken::new(),
        }
    }

    /// Build a resolver from [`UpdateConfig`].
    ///
    /// `http(s)://` app casts use [`HttpDownloader`]; anything else is read
    /// with [`LocalFileDownloader`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No app cast URL is configured
    /// - The public key file cannot be read
    /// - The HTTP client cannot be built
    pub fn from_config(
        config: &UpdateConfig,
        configuration: Arc<dyn Configuration>,
    ) -> Result<Self, UpdateError> {
        let appcast_url = config
            .appcast_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| UpdateError::ConfigError("appcast_url is not set".to_string()))?;

        let verifier = config.security.verifier()?;
        if !verifier.has_valid_key_information() && verifier.signature_needed() {
            warn!("No public key configured - strict mode will reject every update");
        }

        let downloader: Arc<dyn DataDownloader> =
            if appcast_url.starts_with("http://") || appcast_url.starts_with("https://") {
                Arc::new(HttpDownloader::with_config(&config.network.downloader_config())?)
            } else {
                Arc::new(LocalFileDownloader::new())
            };

        Ok(Self::new(appcast_url, downloader, Arc::new(verifier), configuration)
            .with_format(config.format)
            .with_filter(config.channel.to_filter())
            .with_os_filter(config.filter_by_os.then(OsFamily::current)))
    }

    /// Replace the candidate filter.
    pub fn with_filter(mut self, filter: impl ItemFilter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Force a wire format instead of sniffing.
    pub fn with_format(mut self, format: ManifestFormat) -> Self {
        self.format = format;
        self
    }

    /// Restrict items to one OS family, or `None` to keep all.
    pub fn with_os_filter(mut self, family: Option<OsFamily>) -> Self {
        self.os_filter = family;
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// App cast location.
    pub fn appcast_url(&self) -> &str {
        &self.appcast_url
    }

    /// Get the current state of the resolver.
    pub async fn state(&self) -> ResolverState {
        *self.state.read().await
    }

    /// Token that aborts the running check. Once cancelled, later checks
    /// fail immediately too.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort the running check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    async fn set_state(&self, state: ResolverState) {
        debug!(?state, "Resolver state changed");
        *self.state.write().await = state;
    }

    /// Check for available updates.
    ///
    /// This method:
    /// 1. Downloads the app cast
    /// 2. Parses it with the configured or detected codec
    /// 3. Verifies the detached app cast signature when one is needed
    /// 4. Drops items for other platforms and unsigned payloads, then applies the filter
    /// 5. Compares the newest candidate with the skipped version
    ///
    /// Never fails; problems end in [`UpdateStatus::CouldNotDetermine`].
    pub async fn check_for_updates(&self) -> UpdateCheck {
        let snapshot = self.configuration.snapshot();
        info!(
            app = %snapshot.application_identity,
            installed = %snapshot.installed_version,
            url = %self.appcast_url,
            "Checking for updates"
        );

        let check = match self.run_check(&snapshot).await {
            Ok(check) => {
                if let Err(e) = self.configuration.set_last_check_time(Utc::now()) {
                    warn!(error = %e, "Failed to record update check time");
                }
                check
            }
            Err(e) => {
                error!(error = %e, "Update check failed");
                UpdateCheck::could_not_determine()
            }
        };

        match check.latest() {
            Some(latest) => info!(
                status = %check.status,
                latest = %latest.version,
                candidates = check.items.len(),
                "Update check finished"
            ),
            None => info!(status = %check.status, "Update check finished"),
        }
        self.set_state(ResolverState::Done(check.status)).await;
        check
    }

    async fn run_check(&self, snapshot: &ConfigSnapshot) -> Result<UpdateCheck, UpdateError> {
        self.set_state(ResolverState::Downloading).await;
        let data = self.download(&self.appcast_url).await?;

        self.set_state(ResolverState::Parsing).await;
        self.ensure_not_cancelled()?;
        let kind = self.format.resolve(&data);
        let mut manifest = kind.codec().deserialize(&data)?;
        manifest.resolve_links(&self.appcast_url);
        debug!(format = %kind, items = manifest.items.len(), "App cast decoded");

        self.set_state(ResolverState::Verifying).await;
        self.verify_appcast(&data).await?;

        self.set_state(ResolverState::Filtering).await;
        self.ensure_not_cancelled()?;
        let items = self.prefilter(manifest.items);
        let items = self.filter.filter(&snapshot.installed_version, items);

        let status = match items.first() {
            None => UpdateStatus::UpdateNotAvailable,
            Some(latest)
                if snapshot.skip_this_version.as_deref().map(str::trim)
                    == Some(latest.version.as_str()) =>
            {
                info!(version = %latest.version, "Newest update was skipped by the user");
                UpdateStatus::UserSkipped
            }
            Some(_) => UpdateStatus::UpdateAvailable,
        };

        let items = match status {
            UpdateStatus::UpdateAvailable | UpdateStatus::UserSkipped => items,
            _ => Vec::new(),
        };
        Ok(UpdateCheck { status, items })
    }

    fn ensure_not_cancelled(&self) -> Result<(), UpdateError> {
        if self.cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, UpdateError> {
        self.ensure_not_cancelled()?;
        tokio::select! {
            _ = self.cancel.cancelled() => {
                warn!(url, "Download cancelled");
                Err(UpdateError::Cancelled)
            }
            result = self.downloader.download_bytes(url) => result,
        }
    }

    /// Verify the detached `<appcast>.signature` over the raw app cast bytes.
    async fn verify_appcast(&self, data: &[u8]) -> Result<(), UpdateError> {
        if !self.verifier.signature_needed() {
            debug!("App cast signature not required");
            return Ok(());
        }

        let signature_url = format!("{}{}", self.appcast_url, APPCAST_SIGNATURE_SUFFIX);
        let signature = match self.download(&signature_url).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
            Err(UpdateError::Cancelled) => return Err(UpdateError::Cancelled),
            Err(e) => {
                return Err(UpdateError::AppCastSignatureRejected(format!(
                    "signature unavailable at {signature_url}: {e}"
                )))
            }
        };

        match self.verifier.verify(Some(&signature), data) {
            SignatureVerificationResult::Invalid => Err(UpdateError::AppCastSignatureRejected(
                "signature does not match app cast".to_string(),
            )),
            result => {
                debug!(%result, "App cast signature accepted");
                Ok(())
            }
        }
    }

    /// Drop items for other platforms and items whose payload cannot be trusted.
    fn prefilter(&self, items: Vec<ManifestItem>) -> Vec<ManifestItem> {
        let needs_signature = self.verifier.signature_needed();
        items
            .into_iter()
            .filter(|item| {
                if let Some(family) = self.os_filter {
                    if !item.is_for(family) {
                        debug!(version = %item.version, os = %item.operating_system, "Item is for another platform");
                        return false;
                    }
                }
                if needs_signature && item.download_link.is_some() && item.download_signature.is_none() {
                    warn!(version = %item.version, "Dropping unsigned item");
                    return false;
                }
                true
            })
            .collect()
    }

    /// Check a downloaded payload against the item's signature.
    pub fn verify_download(
        &self,
        item: &ManifestItem,
        path: &Path,
    ) -> Result<SignatureVerificationResult, UpdateError> {
        let result = self
            .verifier
            .verify_file(item.download_signature.as_deref(), path)?;
        info!(version = %item.version, path = ?path, %result, "Payload signature checked");
        Ok(result)
    }

    /// Download an item's payload to `dest`, verifying it before anything is written.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::SignatureVerificationFailed`] when the payload
    /// signature is invalid; `dest` is not created in that case.
    pub async fn download_update(
        &self,
        item: &ManifestItem,
        dest: &Path,
    ) -> Result<SignatureVerificationResult, UpdateError> {
        let url = item
            .download_link
            .as_deref()
            .ok_or_else(|| UpdateError::InvalidItem(format!("{} has no download link", item.version)))?;

        let data = self.download(url).await?;
        let result = self.verifier.verify(item.download_signature.as_deref(), &data);
        if !result.is_acceptable() {
            error!(version = %item.version, "Payload signature verification failed");
            return Err(UpdateError::SignatureVerificationFailed(format!(
                "payload for {} does not match its signature",
                item.version
            )));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &data).await?;
        info!(version = %item.version, bytes = data.len(), dest = ?dest, "Update downloaded");
        Ok(result)
    }

    /// Remember the item's version as skipped.
    pub fn skip_version(&self, item: &ManifestItem) -> Result<(), UpdateError> {
        info!(version = %item.version, "Skipping version");
        self.configuration.set_version_to_skip(Some(item.version.as_str()))
    }
}
