//! Data sources for app casts, signatures, release notes and payloads.
//!
//! The resolver only sees the [`DataDownloader`] trait. Three sources ship:
//! - [`HttpDownloader`]: reqwest client with timeouts and a user agent
//! - [`LocalFileDownloader`]: `file://` URLs and plain paths
//! - [`MemoryDownloader`]: canned responses for tests and embedding

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::error::UpdateError;

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default read timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// Fetches raw bytes for a URL.
#[async_trait]
pub trait DataDownloader: Send + Sync {
    /// Download the full body at `url`.
    async fn download_bytes(&self, url: &str) -> Result<Vec<u8>, UpdateError>;

    /// Text encoding of downloaded documents.
    fn encoding(&self) -> &'static str {
        "utf-8"
    }

    /// Blocking variant of [`download_bytes`](Self::download_bytes).
    ///
    /// Spins up a current-thread runtime, so it must not be called from
    /// inside an async context.
    fn download_bytes_blocking(&self, url: &str) -> Result<Vec<u8>, UpdateError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.download_bytes(url))
    }
}

/// Configuration for the HTTP downloader.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Connection timeout in seconds.
    pub timeout_secs: u64,
    /// Read timeout in seconds.
    pub read_timeout_secs: u64,
    /// User agent string.
    pub user_agent: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            user_agent: default_user_agent(),
        }
    }
}

/// User agent sent when none is configured.
pub fn default_user_agent() -> String {
    format!("appcast/{}", env!("CARGO_PKG_VERSION"))
}

/// HTTP(S) data source.
pub struct HttpDownloader {
    /// HTTP client configured with timeouts.
    client: reqwest::Client,
}

impl HttpDownloader {
    /// Create a downloader with default settings.
    pub fn new() -> Result<Self, UpdateError> {
        Self::with_config(&DownloaderConfig::default())
    }

    /// Create a downloader with custom configuration.
    pub fn with_config(config: &DownloaderConfig) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl DataDownloader for HttpDownloader {
    async fn download_bytes(&self, url: &str) -> Result<Vec<u8>, UpdateError> {
        debug!(url, "Fetching URL");

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(UpdateError::DownloadFailed {
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        debug!(bytes = bytes.len(), "Fetched URL");
        Ok(bytes.to_vec())
    }
}

/// Reads `file://` URLs and filesystem paths.
#[derive(Debug, Clone, Default)]
pub struct LocalFileDownloader {
    /// Directory relative paths are resolved against
    base_dir: Option<PathBuf>,
}

impl LocalFileDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `base_dir` instead of the working directory.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// Map a `file://` URL or plain path to a filesystem path.
    pub fn path_for(&self, location: &str) -> Result<PathBuf, UpdateError> {
        if location.starts_with("file:") {
            let url = Url::parse(location)?;
            return url
                .to_file_path()
                .map_err(|_| UpdateError::InvalidUrl(format!("not a local file URL: {location}")));
        }

        let path = PathBuf::from(location);
        Ok(match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        })
    }
}

#[async_trait]
impl DataDownloader for LocalFileDownloader {
    async fn download_bytes(&self, url: &str) -> Result<Vec<u8>, UpdateError> {
        let path = self.path_for(url)?;
        debug!(path = ?path, "Reading local file");
        Ok(tokio::fs::read(&path).await?)
    }
}

/// In-memory data source keyed by URL.
///
/// Unknown URLs fail with a 404 [`UpdateError::DownloadFailed`].
#[derive(Debug, Default)]
pub struct MemoryDownloader {
    responses: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MemoryDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style response registration.
    pub fn with_response(self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.insert(url, body);
        self
    }

    /// Delay every response, e.g. to exercise cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Register or replace the body served for `url`.
    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.into(), body.into());
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl DataDownloader for MemoryDownloader {
    async fn download_bytes(&self, url: &str) -> Result<Vec<u8>, UpdateError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
            .ok_or(UpdateError::DownloadFailed { status: 404 })
    }
}
