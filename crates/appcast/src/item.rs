//! Release entries of an app cast.

use chrono::{DateTime, Utc};
use url::Url;

use crate::error::UpdateError;
use crate::version::SemVerLike;

/// Operating system token written when an item does not name one.
pub const DEFAULT_OPERATING_SYSTEM: &str = "windows";

/// MIME type written when an item does not name one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Operating system family an item targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl OsFamily {
    /// Classify an OS token such as `win`, `windows-x64`, `osx` or `linux-arm64`.
    ///
    /// Matching is case-insensitive on prefixes and substrings.
    pub fn classify(token: &str) -> Self {
        let token = token.trim().to_ascii_lowercase();
        if token.starts_with("win") {
            Self::Windows
        } else if token.starts_with("mac") || token.starts_with("osx") || token.contains("darwin")
        {
            Self::MacOs
        } else if token.contains("linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }

    /// Family of the platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Windows => write!(f, "windows"),
            Self::MacOs => write!(f, "macos"),
            Self::Linux => write!(f, "linux"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One release entry of an app cast.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestItem {
    /// Human-readable title
    pub title: String,
    /// Release version
    pub version: SemVerLike,
    /// Marketing version shown to users
    pub short_version: Option<String>,
    /// Payload URL
    pub download_link: Option<String>,
    /// Signature over the payload bytes
    pub download_signature: Option<String>,
    /// Release notes URL
    pub release_notes_link: Option<String>,
    /// Signature over the release notes bytes
    pub release_notes_signature: Option<String>,
    /// Inline description (HTML or Markdown)
    pub description: Option<String>,
    /// Publication date
    pub publication_date: Option<DateTime<Utc>>,
    /// Whether the release must be installed
    pub is_critical: bool,
    /// Payload size in bytes
    pub size: i64,
    /// Target operating system token
    pub operating_system: String,
    /// Payload MIME type
    pub mime_type: String,
    /// Release channel; `None` is stable
    pub channel: Option<String>,
}

impl ManifestItem {
    /// Create an item with the given version; all other fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::InvalidItem`] if `version` is empty.
    pub fn new(version: &str) -> Result<Self, UpdateError> {
        let version = SemVerLike::parse(version);
        if version.is_empty() {
            return Err(UpdateError::InvalidItem("version must not be empty".to_string()));
        }
        Ok(Self {
            title: String::new(),
            version,
            short_version: None,
            download_link: None,
            download_signature: None,
            release_notes_link: None,
            release_notes_signature: None,
            description: None,
            publication_date: None,
            is_critical: false,
            size: 0,
            operating_system: DEFAULT_OPERATING_SYSTEM.to_string(),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            channel: None,
        })
    }

    /// Operating system family of this item.
    pub fn os_family(&self) -> OsFamily {
        OsFamily::classify(&self.operating_system)
    }

    /// Whether this item targets the given family.
    pub fn is_for(&self, family: OsFamily) -> bool {
        self.os_family() == family
    }

    /// Explicit channel name, ignoring blank values.
    pub fn explicit_channel(&self) -> Option<&str> {
        self.channel
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Resolve relative download and release-notes links against the app cast URL.
    ///
    /// A link that cannot be parsed is logged and left as written.
    pub fn resolve_links(&mut self, base: &Url) {
        for link in [&mut self.download_link, &mut self.release_notes_link]
            .into_iter()
            .flatten()
        {
            match resolve_link(base, link) {
                Ok(resolved) => *link = resolved,
                Err(e) => {
                    tracing::warn!(version = %self.version, link = %link, error = %e, "Unresolvable item link");
                }
            }
        }
    }
}

/// Join `link` onto `base` unless it is already absolute.
pub fn resolve_link(base: &Url, link: &str) -> Result<String, UpdateError> {
    match Url::parse(link) {
        Ok(absolute) => Ok(absolute.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(base.join(link)?.to_string()),
        Err(e) => Err(e.into()),
    }
}

/// Normalize an optional string: blank becomes `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_version() {
        assert!(matches!(
            ManifestItem::new("   "),
            Err(UpdateError::InvalidItem(_))
        ));
    }

    #[test]
    fn test_new_defaults() {
        let item = ManifestItem::new("1.2").unwrap();
        assert_eq!(item.operating_system, "windows");
        assert_eq!(item.mime_type, "application/octet-stream");
        assert!(!item.is_critical);
        assert!(item.channel.is_none());
    }

    #[test]
    fn test_os_classification() {
        for token in ["win", "Windows", "windows-x64", "WIN64"] {
            assert_eq!(OsFamily::classify(token), OsFamily::Windows, "{token}");
        }
        for token in ["mac", "macOS", "osx", "macos-arm64", "osx-x64", "darwin"] {
            assert_eq!(OsFamily::classify(token), OsFamily::MacOs, "{token}");
        }
        for token in ["linux", "Linux-x64", "linux-arm64"] {
            assert_eq!(OsFamily::classify(token), OsFamily::Linux, "{token}");
        }
        assert_eq!(OsFamily::classify("freebsd"), OsFamily::Other);
    }

    #[test]
    fn test_explicit_channel_ignores_blank() {
        let mut item = ManifestItem::new("1.0").unwrap();
        item.channel = Some("  ".to_string());
        assert_eq!(item.explicit_channel(), None);
        item.channel = Some("beta".to_string());
        assert_eq!(item.explicit_channel(), Some("beta"));
    }

    #[test]
    fn test_resolve_relative_links() {
        let base = Url::parse("https://example.com/updates/appcast.xml").unwrap();
        let mut item = ManifestItem::new("1.0").unwrap();
        item.download_link = Some("app-1.0.zip".to_string());
        item.release_notes_link = Some("https://cdn.example.com/notes/1.0.md".to_string());
        item.resolve_links(&base);
        assert_eq!(
            item.download_link.as_deref(),
            Some("https://example.com/updates/app-1.0.zip")
        );
        assert_eq!(
            item.release_notes_link.as_deref(),
            Some("https://cdn.example.com/notes/1.0.md")
        );
    }

    #[test]
    fn test_unparsable_link_is_kept_as_written() {
        let base = Url::parse("https://example.com/updates/appcast.xml").unwrap();
        let mut item = ManifestItem::new("0.5").unwrap();
        item.download_link = Some("http://exa mple.com/old.zip".to_string());
        item.release_notes_link = Some("notes/0.5.md".to_string());
        item.resolve_links(&base);
        assert_eq!(item.download_link.as_deref(), Some("http://exa mple.com/old.zip"));
        assert_eq!(
            item.release_notes_link.as_deref(),
            Some("https://example.com/updates/notes/0.5.md")
        );
    }
}
