//! Error types for the update client.

use thiserror::Error;

/// Errors that can occur during update operations.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// App cast document could not be parsed
    #[error("app cast parse error: {0}")]
    ManifestParse(String),

    /// A release entry violates the data model (e.g. empty version)
    #[error("invalid release item: {0}")]
    InvalidItem(String),

    /// Signature could not be decoded or checked
    #[error("signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    /// App cast signature was invalid or missing while one was required
    #[error("app cast signature rejected: {0}")]
    AppCastSignatureRejected(String),

    /// Public or secret key material is malformed
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Download failed with HTTP status
    #[error("download failed with status {status}")]
    DownloadFailed { status: u16 },

    /// Download was cancelled
    #[error("download cancelled")]
    Cancelled,

    /// Network error during download
    #[error("network error: {0}")]
    NetworkError(String),

    /// URL could not be parsed or resolved
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    HttpError(String),
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        UpdateError::HttpError(err.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for UpdateError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        UpdateError::SignatureVerificationFailed(err.to_string())
    }
}

impl From<quick_xml::Error> for UpdateError {
    fn from(err: quick_xml::Error) -> Self {
        UpdateError::ManifestParse(err.to_string())
    }
}

impl From<url::ParseError> for UpdateError {
    fn from(err: url::ParseError) -> Self {
        UpdateError::InvalidUrl(err.to_string())
    }
}
