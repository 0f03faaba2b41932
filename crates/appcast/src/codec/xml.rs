//! RSS 2.0 app cast with the sparkle namespace.
//!
//! ```xml
//! <rss version="2.0" xmlns:sparkle="http://www.andymatuschak.org/xml-namespaces/sparkle">
//!   <channel>
//!     <title>App</title>
//!     <item>
//!       <title>Version 1.1</title>
//!       <sparkle:releaseNotesLink sparkle:signature="...">https://.../1.1.md</sparkle:releaseNotesLink>
//!       <pubDate>Mon, 02 Jan 2023 10:00:00 +00:00</pubDate>
//!       <sparkle:channel>beta</sparkle:channel>
//!       <enclosure url="https://.../app-1.1.zip" sparkle:version="1.1" length="1024"
//!                  sparkle:signature="..." sparkle:os="windows" type="application/octet-stream"/>
//!     </item>
//!   </channel>
//! </rss>
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, QName, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::Writer;

use super::{finish, CodecKind, ManifestCodec};
use crate::error::UpdateError;
use crate::item::{non_blank, ManifestItem, DEFAULT_MIME_TYPE, DEFAULT_OPERATING_SYSTEM};
use crate::manifest::Manifest;

/// Namespace URI bound to the `sparkle:` prefix.
pub const SPARKLE_NAMESPACE: &str = "http://www.andymatuschak.org/xml-namespaces/sparkle";

const SPARKLE_PREFIX: &[u8] = b"sparkle";

const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %:z";

const ATTR_VERSION: &[u8] = b"sparkle:version";
const ATTR_SHORT_VERSION: &[u8] = b"sparkle:shortVersionString";
const ATTR_SIGNATURE: &[u8] = b"sparkle:signature";
const ATTR_DSA_SIGNATURE: &[u8] = b"sparkle:dsaSignature";
const ATTR_ED_SIGNATURE: &[u8] = b"sparkle:edSignature";
const ATTR_CRITICAL: &[u8] = b"sparkle:criticalUpdate";
const ATTR_OS: &[u8] = b"sparkle:os";

/// Format a publication date the way app casts expect (`Mon, 02 Jan 2023 10:00:00 +00:00`).
pub fn format_pub_date(date: &DateTime<Utc>) -> String {
    date.format(PUB_DATE_FORMAT).to_string()
}

/// Parse an RSS publication date.
///
/// Accepts a numeric offset (`+02:00` or `+0200`), a literal `GMT`/`UTC`/`Z`, or
/// no offset at all (taken as UTC). The weekday is optional and not validated.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    // Feeds frequently carry a weekday that does not match the date.
    let body = match raw.split_once(',') {
        Some((weekday, rest)) if weekday.chars().all(|c| c.is_ascii_alphabetic()) => rest.trim(),
        _ => raw,
    };

    for format in ["%d %b %Y %H:%M:%S %:z", "%d %b %Y %H:%M:%S %z"] {
        if let Ok(date) = DateTime::parse_from_str(body, format) {
            return Some(date.with_timezone(&Utc));
        }
    }

    let naive = ["GMT", "UTC", "Z"]
        .iter()
        .find_map(|zone| body.strip_suffix(zone))
        .map(str::trim_end)
        .unwrap_or(body);
    NaiveDateTime::parse_from_str(naive, "%d %b %Y %H:%M:%S")
        .ok()
        .map(|date| date.and_utc())
}

fn xml_error(err: impl std::fmt::Display) -> UpdateError {
    UpdateError::ManifestParse(err.to_string())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// RSS/XML app cast codec.
#[derive(Debug, Clone)]
pub struct XmlCodec {
    indent: bool,
}

impl Default for XmlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlCodec {
    /// Codec that writes indented XML.
    pub fn new() -> Self {
        Self { indent: true }
    }

    /// Codec that writes XML without whitespace between elements.
    pub fn compact() -> Self {
        Self { indent: false }
    }
}

impl ManifestCodec for XmlCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Xml
    }

    fn serialize(&self, manifest: &Manifest) -> Result<Vec<u8>, UpdateError> {
        let mut writer = if self.indent {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;

        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("version", "2.0"));
        rss.push_attribute(("xmlns:sparkle", SPARKLE_NAMESPACE));
        writer.write_event(Event::Start(rss)).map_err(xml_error)?;
        writer
            .write_event(Event::Start(BytesStart::new("channel")))
            .map_err(xml_error)?;

        write_text_element(&mut writer, "title", &manifest.title)?;
        if let Some(link) = &manifest.link {
            write_text_element(&mut writer, "link", link)?;
        }
        if let Some(description) = &manifest.description {
            write_text_element(&mut writer, "description", description)?;
        }
        if let Some(language) = &manifest.language {
            write_text_element(&mut writer, "language", language)?;
        }

        for item in &manifest.items {
            write_item(&mut writer, item)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("channel")))
            .map_err(xml_error)?;
        writer
            .write_event(Event::End(BytesEnd::new("rss")))
            .map_err(xml_error)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn deserialize(&self, data: &[u8]) -> Result<Manifest, UpdateError> {
        let mut reader = NsReader::from_reader(data);
        let mut buf = Vec::new();
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut text = String::new();
        let mut manifest = Manifest::default();
        let mut saw_channel = false;
        let mut current: Option<ItemBuilder> = None;

        loop {
            match reader.read_event_into(&mut buf).map_err(xml_error)? {
                Event::Start(e) => {
                    let name = element_name(&reader, &e);
                    if name == b"channel" && stack.last().map(Vec::as_slice) == Some(b"rss".as_slice()) {
                        saw_channel = true;
                    }
                    if name == b"item" {
                        current = Some(ItemBuilder::default());
                    } else if let Some(builder) = current.as_mut() {
                        builder.read_attributes(&name, attributes(&reader, &e)?);
                    }
                    text.clear();
                    stack.push(name);
                }
                Event::Empty(e) => {
                    let name = element_name(&reader, &e);
                    if let Some(builder) = current.as_mut() {
                        builder.read_attributes(&name, attributes(&reader, &e)?);
                    }
                }
                Event::Text(t) => {
                    text.push_str(&t.unescape().map_err(xml_error)?);
                }
                Event::CData(c) => {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
                Event::End(_) => {
                    let name = stack.pop().unwrap_or_default();
                    let value = std::mem::take(&mut text);
                    if name == b"item" {
                        if let Some(item) = current.take().and_then(ItemBuilder::build) {
                            manifest.items.push(item);
                        }
                    } else if let Some(builder) = current.as_mut() {
                        builder.read_text(&name, value);
                    } else if stack.last().map(Vec::as_slice) == Some(b"channel".as_slice()) {
                        match name.as_slice() {
                            b"title" => manifest.title = value,
                            b"link" => manifest.link = non_blank(Some(value.trim().to_string())),
                            b"description" => manifest.description = non_blank(Some(value)),
                            b"language" => {
                                manifest.language = non_blank(Some(value.trim().to_string()))
                            }
                            _ => {}
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(UpdateError::ManifestParse(
                "unexpected end of document".to_string(),
            ));
        }
        if !saw_channel {
            return Err(UpdateError::ManifestParse(
                "document has no <rss><channel> element".to_string(),
            ));
        }

        Ok(finish(manifest))
    }
}

/// Name of an element or attribute as matched by the reader.
///
/// Names bound to the sparkle namespace come back as `sparkle:<local>` whatever
/// prefix the document used. Unprefixed names come back as their local name.
/// Any other prefix is kept verbatim so it never matches a known name.
fn canonical_name(resolved: ResolveResult<'_>, name: QName<'_>) -> Vec<u8> {
    let sparkle = match resolved {
        ResolveResult::Bound(Namespace(uri)) => uri == SPARKLE_NAMESPACE.as_bytes(),
        // Hand-written feeds sometimes use the prefix without declaring it.
        ResolveResult::Unknown(prefix) => prefix == SPARKLE_PREFIX,
        ResolveResult::Unbound => false,
    };
    let local = name.local_name();
    if sparkle {
        [SPARKLE_PREFIX, b":".as_slice(), local.as_ref()].concat()
    } else if name.prefix().is_none() {
        local.as_ref().to_vec()
    } else {
        name.as_ref().to_vec()
    }
}

fn element_name(reader: &NsReader<&[u8]>, element: &BytesStart<'_>) -> Vec<u8> {
    let (resolved, _) = reader.resolve_element(element.name());
    canonical_name(resolved, element.name())
}

fn attributes(
    reader: &NsReader<&[u8]>,
    element: &BytesStart<'_>,
) -> Result<Vec<(Vec<u8>, String)>, UpdateError> {
    let mut attributes = Vec::new();
    for attr in element.attributes().with_checks(false).flatten() {
        let (resolved, _) = reader.resolve_attribute(attr.key);
        let key = canonical_name(resolved, attr.key);
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        attributes.push((key, value));
    }
    Ok(attributes)
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &str,
) -> Result<(), UpdateError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_error)?;
    Ok(())
}

fn write_item(writer: &mut Writer<Vec<u8>>, item: &ManifestItem) -> Result<(), UpdateError> {
    writer
        .write_event(Event::Start(BytesStart::new("item")))
        .map_err(xml_error)?;

    write_text_element(writer, "title", &item.title)?;

    if let Some(link) = &item.release_notes_link {
        let mut notes = BytesStart::new("sparkle:releaseNotesLink");
        if let Some(signature) = &item.release_notes_signature {
            notes.push_attribute(("sparkle:signature", signature.as_str()));
        }
        writer.write_event(Event::Start(notes)).map_err(xml_error)?;
        writer
            .write_event(Event::Text(BytesText::new(link)))
            .map_err(xml_error)?;
        writer
            .write_event(Event::End(BytesEnd::new("sparkle:releaseNotesLink")))
            .map_err(xml_error)?;
    }
    if let Some(description) = &item.description {
        write_text_element(writer, "description", description)?;
    }
    if let Some(date) = &item.publication_date {
        write_text_element(writer, "pubDate", &format_pub_date(date))?;
    }
    if let Some(channel) = &item.channel {
        write_text_element(writer, "sparkle:channel", channel)?;
    }

    let size = item.size.to_string();
    let mut enclosure = BytesStart::new("enclosure");
    if let Some(url) = &item.download_link {
        enclosure.push_attribute(("url", url.as_str()));
    }
    enclosure.push_attribute(("sparkle:version", item.version.as_str()));
    if let Some(short_version) = &item.short_version {
        enclosure.push_attribute(("sparkle:shortVersionString", short_version.as_str()));
    }
    enclosure.push_attribute(("length", size.as_str()));
    if let Some(signature) = &item.download_signature {
        enclosure.push_attribute(("sparkle:signature", signature.as_str()));
    }
    if item.is_critical {
        enclosure.push_attribute(("sparkle:criticalUpdate", "true"));
    }
    enclosure.push_attribute(("sparkle:os", item.operating_system.as_str()));
    enclosure.push_attribute(("type", item.mime_type.as_str()));
    writer.write_event(Event::Empty(enclosure)).map_err(xml_error)?;

    writer
        .write_event(Event::End(BytesEnd::new("item")))
        .map_err(xml_error)?;
    Ok(())
}

/// Fields collected while walking one `<item>`.
#[derive(Debug, Default)]
struct ItemBuilder {
    title: Option<String>,
    version: Option<String>,
    short_version: Option<String>,
    download_link: Option<String>,
    download_signature: Option<String>,
    release_notes_link: Option<String>,
    release_notes_signature: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
    is_critical: bool,
    size: Option<String>,
    operating_system: Option<String>,
    mime_type: Option<String>,
    channel: Option<String>,
}

impl ItemBuilder {
    fn read_attributes(&mut self, name: &[u8], attributes: Vec<(Vec<u8>, String)>) {
        match name {
            b"enclosure" => {
                for (key, value) in attributes {
                    match key.as_slice() {
                        b"url" => self.download_link = Some(value),
                        ATTR_VERSION => self.version = Some(value),
                        ATTR_SHORT_VERSION => self.short_version = Some(value),
                        b"length" => self.size = Some(value),
                        b"type" => self.mime_type = Some(value),
                        ATTR_OS => self.operating_system = Some(value),
                        ATTR_CRITICAL => self.is_critical |= parse_bool(&value),
                        ATTR_SIGNATURE => self.download_signature = Some(value),
                        ATTR_ED_SIGNATURE | ATTR_DSA_SIGNATURE => {
                            self.download_signature.get_or_insert(value);
                        }
                        _ => {}
                    }
                }
            }
            b"sparkle:releaseNotesLink" => {
                for (key, value) in attributes {
                    let key = key.as_slice();
                    if key == ATTR_SIGNATURE || key == ATTR_ED_SIGNATURE || key == ATTR_DSA_SIGNATURE {
                        self.release_notes_signature.get_or_insert(value);
                    }
                }
            }
            // Presence of the element marks the item critical.
            b"sparkle:criticalUpdate" => self.is_critical = true,
            _ => {}
        }
    }

    fn read_text(&mut self, name: &[u8], value: String) {
        match name {
            b"title" => self.title = Some(value),
            b"description" => self.description = Some(value),
            b"sparkle:channel" => self.channel = Some(value),
            b"pubDate" => self.pub_date = Some(value.trim().to_string()),
            b"sparkle:releaseNotesLink" => {
                self.release_notes_link = Some(value.trim().to_string());
            }
            b"sparkle:version" => {
                self.version.get_or_insert(value.trim().to_string());
            }
            b"sparkle:shortVersionString" => {
                self.short_version.get_or_insert(value.trim().to_string());
            }
            _ => {}
        }
    }

    fn build(self) -> Option<ManifestItem> {
        let version = self.version.unwrap_or_default();
        let mut item = match ManifestItem::new(&version) {
            Ok(item) => item,
            Err(_) => {
                tracing::warn!(
                    title = self.title.as_deref().unwrap_or(""),
                    "Skipping app cast item without a version"
                );
                return None;
            }
        };

        item.title = self.title.unwrap_or_default();
        item.short_version = non_blank(self.short_version);
        item.download_link = non_blank(self.download_link);
        item.download_signature = non_blank(self.download_signature);
        item.release_notes_link = non_blank(self.release_notes_link);
        item.release_notes_signature = non_blank(self.release_notes_signature);
        item.description = non_blank(self.description);
        item.is_critical = self.is_critical;
        item.channel = non_blank(self.channel);

        if let Some(raw) = non_blank(self.pub_date) {
            item.publication_date = parse_pub_date(&raw);
            if item.publication_date.is_none() {
                tracing::warn!(version = %item.version, date = %raw, "Unparsable publication date");
            }
        }
        if let Some(raw) = non_blank(self.size) {
            item.size = raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(version = %item.version, length = %raw, "Unparsable enclosure length");
                0
            });
        }
        item.operating_system =
            non_blank(self.operating_system).unwrap_or_else(|| DEFAULT_OPERATING_SYSTEM.to_string());
        item.mime_type = non_blank(self.mime_type).unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        Some(item)
    }
}
