//! App cast wire formats.
//!
//! Two codecs share one contract: [`ManifestCodec::deserialize`] never fails on a
//! well-formed but sparse document, skips items that have no version, and
//! returns items sorted newest first (equal versions keep document order).
//! Serializing and parsing back reproduces every populated item field.
//!
//! The file and async helpers are plain I/O around the same two methods.

mod json;
mod xml;

use std::path::Path;

pub use json::JsonCodec;
pub use xml::{format_pub_date, parse_pub_date, XmlCodec, SPARKLE_NAMESPACE};

use crate::error::UpdateError;
use crate::manifest::Manifest;

/// Which wire format a codec speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// RSS 2.0 with the sparkle namespace
    #[default]
    Xml,
    /// Flat JSON item list
    Json,
}

impl CodecKind {
    /// Construct the codec for this format.
    pub fn codec(self) -> Box<dyn ManifestCodec> {
        match self {
            Self::Xml => Box::new(XmlCodec::new()),
            Self::Json => Box::new(JsonCodec::new()),
        }
    }

    /// Pick a format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "xml" | "rss" => Some(Self::Xml),
            _ => None,
        }
    }

    /// Guess the format from the first significant byte of a document.
    pub fn sniff(data: &[u8]) -> Self {
        let data = data.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(data);
        match data.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') | Some(b'[') => Self::Json,
            _ => Self::Xml,
        }
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Xml => write!(f, "xml"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xml" | "rss" => Ok(Self::Xml),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown app cast format: {s}")),
        }
    }
}

/// Bidirectional mapping between a [`Manifest`] and bytes.
pub trait ManifestCodec: Send + Sync {
    /// Format spoken by this codec.
    fn kind(&self) -> CodecKind;

    /// Encode a manifest.
    fn serialize(&self, manifest: &Manifest) -> Result<Vec<u8>, UpdateError>;

    /// Decode a manifest; items come back sorted newest first.
    fn deserialize(&self, data: &[u8]) -> Result<Manifest, UpdateError>;

    /// Encode to a UTF-8 string.
    fn serialize_to_string(&self, manifest: &Manifest) -> Result<String, UpdateError> {
        let bytes = self.serialize(manifest)?;
        String::from_utf8(bytes).map_err(|e| UpdateError::ManifestParse(e.to_string()))
    }

    /// Decode from a string.
    fn deserialize_str(&self, data: &str) -> Result<Manifest, UpdateError> {
        self.deserialize(data.as_bytes())
    }

    /// Read and decode a file.
    fn read_file(&self, path: &Path) -> Result<Manifest, UpdateError> {
        let data = std::fs::read(path)?;
        self.deserialize(&data)
    }

    /// Encode and write a file, creating parent directories.
    fn write_file(&self, manifest: &Manifest, path: &Path) -> Result<(), UpdateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.serialize(manifest)?)?;
        Ok(())
    }
}

/// Async counterpart of [`ManifestCodec::read_file`].
pub async fn read_file_async(
    codec: &dyn ManifestCodec,
    path: &Path,
) -> Result<Manifest, UpdateError> {
    let data = tokio::fs::read(path).await?;
    codec.deserialize(&data)
}

/// Async counterpart of [`ManifestCodec::write_file`].
pub async fn write_file_async(
    codec: &dyn ManifestCodec,
    manifest: &Manifest,
    path: &Path,
) -> Result<(), UpdateError> {
    let data = codec.serialize(manifest)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await?;
    Ok(())
}

/// Shared post-processing for both decoders.
fn finish(mut manifest: Manifest) -> Manifest {
    manifest.sort_items();
    debug_assert!(manifest.is_sorted());
    tracing::debug!(
        title = %manifest.title,
        items = manifest.items.len(),
        "Parsed app cast"
    );
    manifest
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::item::ManifestItem;

    #[test]
    fn test_codec_kind_from_path() {
        assert_eq!(CodecKind::from_path(Path::new("a/appcast.json")), Some(CodecKind::Json));
        assert_eq!(CodecKind::from_path(Path::new("appcast.XML")), Some(CodecKind::Xml));
        assert_eq!(CodecKind::from_path(Path::new("appcast")), None);
    }

    #[test]
    fn test_codec_kind_sniff() {
        assert_eq!(CodecKind::sniff(b"  \n{\"items\":[]}"), CodecKind::Json);
        assert_eq!(CodecKind::sniff(b"\xEF\xBB\xBF<?xml version=\"1.0\"?>"), CodecKind::Xml);
        assert_eq!(CodecKind::sniff(b""), CodecKind::Xml);
    }

    #[test]
    fn test_codec_kind_parse() {
        assert_eq!("JSON".parse::<CodecKind>().unwrap(), CodecKind::Json);
        assert_eq!("rss".parse::<CodecKind>().unwrap(), CodecKind::Xml);
        assert!("yaml".parse::<CodecKind>().is_err());
    }

    #[test]
    fn test_file_wrappers() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = Manifest::new("App").with_item(ManifestItem::new("1.0").unwrap());

        for kind in [CodecKind::Xml, CodecKind::Json] {
            let codec = kind.codec();
            let path = temp_dir.path().join("nested").join(format!("appcast.{kind}"));
            codec.write_file(&manifest, &path).unwrap();
            let back = codec.read_file(&path).unwrap();
            assert_eq!(back.title, "App");
            assert_eq!(back.items.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_async_file_wrappers() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("appcast.json");
        let manifest = Manifest::new("App").with_item(ManifestItem::new("2.1").unwrap());
        let codec = CodecKind::Json.codec();

        write_file_async(codec.as_ref(), &manifest, &path).await.unwrap();
        let back = read_file_async(codec.as_ref(), &path).await.unwrap();
        assert_eq!(back.items[0].version.as_str(), "2.1");
    }
}
