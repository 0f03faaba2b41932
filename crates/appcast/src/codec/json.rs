//! JSON app cast.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{finish, parse_pub_date, CodecKind, ManifestCodec};
use crate::error::UpdateError;
use crate::item::{non_blank, ManifestItem, DEFAULT_MIME_TYPE, DEFAULT_OPERATING_SYSTEM};
use crate::manifest::Manifest;

/// Wire shape of the whole document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    language: Option<String>,
    #[serde(default)]
    items: Vec<ItemDocument>,
}

/// Wire shape of one item.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ItemDocument {
    #[serde(default)]
    title: String,
    #[serde(default)]
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    short_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    release_notes_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    release_notes_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    publication_date: Option<String>,
    #[serde(default)]
    is_critical: bool,
    #[serde(default)]
    size: i64,
    #[serde(default = "default_os")]
    os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(rename = "type", default = "default_mime_type")]
    mime_type: String,
}

fn default_os() -> String {
    DEFAULT_OPERATING_SYSTEM.to_string()
}

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_string()
}

/// RFC 3339 first, then the RSS forms for hand-written feeds.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|date| date.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_pub_date(raw))
}

impl From<&ManifestItem> for ItemDocument {
    fn from(item: &ManifestItem) -> Self {
        Self {
            title: item.title.clone(),
            version: item.version.to_string(),
            short_version: item.short_version.clone(),
            url: item.download_link.clone(),
            signature: item.download_signature.clone(),
            release_notes_link: item.release_notes_link.clone(),
            release_notes_signature: item.release_notes_signature.clone(),
            description: item.description.clone(),
            publication_date: item
                .publication_date
                .map(|date| date.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            is_critical: item.is_critical,
            size: item.size,
            os: item.operating_system.clone(),
            channel: item.channel.clone(),
            mime_type: item.mime_type.clone(),
        }
    }
}

impl ItemDocument {
    fn into_item(self) -> Option<ManifestItem> {
        let mut item = match ManifestItem::new(&self.version) {
            Ok(item) => item,
            Err(_) => {
                tracing::warn!(title = %self.title, "Skipping app cast item without a version");
                return None;
            }
        };

        item.title = self.title;
        item.short_version = non_blank(self.short_version);
        item.download_link = non_blank(self.url);
        item.download_signature = non_blank(self.signature);
        item.release_notes_link = non_blank(self.release_notes_link);
        item.release_notes_signature = non_blank(self.release_notes_signature);
        item.description = non_blank(self.description);
        item.is_critical = self.is_critical;
        item.size = self.size;
        item.channel = non_blank(self.channel);
        if !self.os.trim().is_empty() {
            item.operating_system = self.os;
        }
        if !self.mime_type.trim().is_empty() {
            item.mime_type = self.mime_type;
        }
        if let Some(raw) = non_blank(self.publication_date) {
            item.publication_date = parse_date(&raw);
            if item.publication_date.is_none() {
                tracing::warn!(version = %item.version, date = %raw, "Unparsable publication date");
            }
        }

        Some(item)
    }
}

/// JSON app cast codec.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Codec that writes pretty-printed JSON.
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// Codec that writes single-line JSON.
    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestCodec for JsonCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Json
    }

    fn serialize(&self, manifest: &Manifest) -> Result<Vec<u8>, UpdateError> {
        let document = ManifestDocument {
            title: manifest.title.clone(),
            description: manifest.description.clone(),
            link: manifest.link.clone(),
            language: manifest.language.clone(),
            items: manifest.items.iter().map(ItemDocument::from).collect(),
        };
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&document)?
        } else {
            serde_json::to_vec(&document)?
        };
        Ok(bytes)
    }

    fn deserialize(&self, data: &[u8]) -> Result<Manifest, UpdateError> {
        let data = data.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(data);
        let document: ManifestDocument = serde_json::from_slice(data)
            .map_err(|e| UpdateError::ManifestParse(format!("invalid JSON app cast: {e}")))?;

        let manifest = Manifest {
            title: document.title,
            description: non_blank(document.description),
            link: non_blank(document.link),
            language: non_blank(document.language),
            items: document
                .items
                .into_iter()
                .filter_map(ItemDocument::into_item)
                .collect(),
        };
        Ok(finish(manifest))
    }
}
