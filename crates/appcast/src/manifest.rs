//! The parsed app cast document.

use url::Url;

use crate::item::ManifestItem;

/// An app cast: document metadata plus release items in descending version order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    /// Feed title
    pub title: String,
    /// Feed description
    pub description: Option<String>,
    /// Feed home page
    pub link: Option<String>,
    /// Feed language (e.g. `en`)
    pub language: Option<String>,
    /// Release items
    pub items: Vec<ManifestItem>,
}

impl Manifest {
    /// Create an empty manifest with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Builder-style item append. Items are re-sorted.
    pub fn with_item(mut self, item: ManifestItem) -> Self {
        self.items.push(item);
        self.sort_items();
        self
    }

    /// Sort items by version, newest first. Equal versions keep document order.
    pub fn sort_items(&mut self) {
        self.items.sort_by(|a, b| b.version.cmp(&a.version));
    }

    /// Whether items are in descending version order.
    pub fn is_sorted(&self) -> bool {
        self.items.windows(2).all(|w| w[0].version >= w[1].version)
    }

    /// Highest-versioned item.
    pub fn latest(&self) -> Option<&ManifestItem> {
        self.items.first()
    }

    /// Resolve every relative item link against the URL the app cast was loaded from.
    ///
    /// Local paths have no base, so their links are left untouched.
    pub fn resolve_links(&mut self, source: &str) {
        let base = match Url::parse(source) {
            Ok(base) if !base.cannot_be_a_base() => base,
            _ => return,
        };
        for item in &mut self.items {
            item.resolve_links(&base);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(version: &str) -> ManifestItem {
        ManifestItem::new(version).unwrap()
    }

    #[test]
    fn test_sort_items_descending_and_stable() {
        let mut first = item("1.0");
        first.title = "first".to_string();
        let mut second = item("1.0.0");
        second.title = "second".to_string();

        let mut manifest = Manifest::new("App");
        manifest.items = vec![item("0.9"), first, item("2.0-beta"), second, item("2.0")];
        manifest.sort_items();

        let versions: Vec<&str> = manifest.items.iter().map(|i| i.version.as_str()).collect();
        assert_eq!(versions, vec!["2.0", "2.0-beta", "1.0", "1.0.0", "0.9"]);
        assert_eq!(manifest.items[2].title, "first");
        assert!(manifest.is_sorted());
    }

    #[test]
    fn test_resolve_links_ignores_local_sources() {
        let mut manifest = Manifest::new("App").with_item({
            let mut i = item("1.0");
            i.download_link = Some("app.zip".to_string());
            i
        });
        manifest.resolve_links("appcast.xml");
        assert_eq!(manifest.items[0].download_link.as_deref(), Some("app.zip"));

        manifest.resolve_links("https://example.com/feed/appcast.xml");
        assert_eq!(
            manifest.items[0].download_link.as_deref(),
            Some("https://example.com/feed/app.zip")
        );
    }
}
