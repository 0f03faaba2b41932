//! Release notes for update candidates.
//!
//! Notes come from an item's `release_notes_link` when it has one, checked
//! against `release_notes_signature`, and otherwise from its inline
//! description. All links are fetched concurrently; results keep item order.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::download::DataDownloader;
use crate::item::ManifestItem;
use crate::signature::{SignatureVerificationResult, SignatureVerifier};
use crate::version::SemVerLike;

/// Release notes of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseNotes {
    /// Downloaded from the release notes link
    Fetched {
        content: String,
        signature: SignatureVerificationResult,
    },
    /// Taken from the item description
    Inline(String),
    /// Could not be shown; the message replaces the notes
    Unavailable(String),
    /// The item has neither a link nor a description
    Missing,
}

impl ReleaseNotes {
    /// Text to display, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Fetched { content, .. } | Self::Inline(content) => Some(content),
            Self::Unavailable(_) | Self::Missing => None,
        }
    }
}

/// Release notes paired with the item they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReleaseNotes {
    pub version: SemVerLike,
    pub title: String,
    pub notes: ReleaseNotes,
}

/// Fetches and verifies release notes.
pub struct ReleaseNotesFetcher {
    downloader: Arc<dyn DataDownloader>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl ReleaseNotesFetcher {
    pub fn new(downloader: Arc<dyn DataDownloader>, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            downloader,
            verifier,
        }
    }

    /// Notes for every item, in the order given.
    pub async fn fetch_all(&self, items: &[ManifestItem]) -> Vec<ItemReleaseNotes> {
        join_all(items.iter().map(|item| async move {
            ItemReleaseNotes {
                version: item.version.clone(),
                title: item.title.clone(),
                notes: self.fetch(item).await,
            }
        }))
        .await
    }

    /// Notes for one item.
    pub async fn fetch(&self, item: &ManifestItem) -> ReleaseNotes {
        let Some(link) = item.release_notes_link.as_deref() else {
            return match &item.description {
                Some(description) => ReleaseNotes::Inline(description.clone()),
                None => ReleaseNotes::Missing,
            };
        };

        let data = match self.downloader.download_bytes(link).await {
            Ok(data) => data,
            Err(e) => {
                warn!(version = %item.version, link, error = %e, "Failed to download release notes");
                return ReleaseNotes::Unavailable(format!("Release notes could not be downloaded: {e}"));
            }
        };

        let signature = self
            .verifier
            .verify(item.release_notes_signature.as_deref(), &data);
        if signature == SignatureVerificationResult::Invalid {
            warn!(version = %item.version, link, "Release notes signature is invalid");
            return ReleaseNotes::Unavailable(
                "Release notes signature is invalid; notes are not shown".to_string(),
            );
        }

        debug!(version = %item.version, bytes = data.len(), %signature, "Release notes fetched");
        ReleaseNotes::Fetched {
            content: String::from_utf8_lossy(&data).into_owned(),
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::download::MemoryDownloader;
    use crate::signature::{Ed25519Signer, Ed25519Verifier, SecurityMode};

    fn item(version: &str, link: Option<&str>) -> ManifestItem {
        let mut item = ManifestItem::new(version).unwrap();
        item.release_notes_link = link.map(str::to_string);
        item
    }

    #[tokio::test]
    async fn test_fetch_all_preserves_order_and_checks_signatures() {
        let signer = Ed25519Signer::generate();
        let downloader = MemoryDownloader::new()
            .with_response("https://a/1.2.md", "# 1.2")
            .with_response("https://a/1.1.md", "# 1.1")
            .with_delay(Duration::from_millis(5));

        let mut good = item("1.2", Some("https://a/1.2.md"));
        good.release_notes_signature = Some(signer.sign(b"# 1.2"));
        let mut bad = item("1.1", Some("https://a/1.1.md"));
        bad.release_notes_signature = Some(signer.sign(b"something else"));
        let mut inline = item("1.0", None);
        inline.description = Some("<p>Fixes</p>".to_string());
        let missing_link = item("0.9", Some("https://a/0.9.md"));
        let bare = item("0.8", None);

        let fetcher = ReleaseNotesFetcher::new(
            Arc::new(downloader),
            Arc::new(Ed25519Verifier::new(
                SecurityMode::UseIfPossible,
                Some(&signer.public_key_string()),
            )),
        );
        let notes = fetcher
            .fetch_all(&[good, bad, inline, missing_link, bare])
            .await;

        let versions: Vec<&str> = notes.iter().map(|n| n.version.as_str()).collect();
        assert_eq!(versions, vec!["1.2", "1.1", "1.0", "0.9", "0.8"]);
        assert_eq!(
            notes[0].notes,
            ReleaseNotes::Fetched {
                content: "# 1.2".to_string(),
                signature: SignatureVerificationResult::Valid,
            }
        );
        assert!(matches!(notes[1].notes, ReleaseNotes::Unavailable(_)));
        assert_eq!(notes[2].notes.content(), Some("<p>Fixes</p>"));
        assert!(matches!(notes[3].notes, ReleaseNotes::Unavailable(_)));
        assert_eq!(notes[4].notes, ReleaseNotes::Missing);
    }

    #[tokio::test]
    async fn test_unsigned_notes_in_unsafe_mode() {
        let downloader = MemoryDownloader::new().with_response("https://a/notes.md", "notes");
        let fetcher = ReleaseNotesFetcher::new(
            Arc::new(downloader),
            Arc::new(Ed25519Verifier::without_key(SecurityMode::Unsafe)),
        );
        let notes = fetcher.fetch(&item("1.0", Some("https://a/notes.md"))).await;
        assert_eq!(
            notes,
            ReleaseNotes::Fetched {
                content: "notes".to_string(),
                signature: SignatureVerificationResult::Unchecked,
            }
        );
    }
}
