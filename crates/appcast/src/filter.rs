//! Narrowing an app cast to installable candidates.
//!
//! # Channels
//!
//! An item belongs to a channel in one of two ways:
//! - **Explicit**: the item names one (`<sparkle:channel>beta</sparkle:channel>`)
//! - **Derived**: the leading letters of its first pre-release identifier
//!   (`1.1-beta1` is `beta`, `2.0-rc.2` is `rc`)
//!
//! Items with neither are stable and always eligible.
//!
//! # Reducers
//!
//! A [`Reducer`] maps `(installed, items)` to a narrower list. Reducers are
//! plain closures and chain with [`mix`]:
//!
//! ```ignore
//! use appcast::filter::{mix, newer_first, only_retail_versions, remove_older_versions};
//!
//! let pipeline = mix(vec![only_retail_versions(), remove_older_versions(), newer_first()]);
//! let candidates = pipeline(&installed, manifest.items);
//! ```

use std::sync::Arc;

use crate::item::{ManifestItem, OsFamily};
use crate::version::{default_version_trimmer, SemVerLike, VersionTrimmer};

/// A list transformation over app cast items given the installed version.
pub type Reducer = Arc<dyn Fn(&SemVerLike, Vec<ManifestItem>) -> Vec<ManifestItem> + Send + Sync>;

/// Anything that narrows the parsed item list for the resolver.
pub trait ItemFilter: Send + Sync {
    /// Return the installable items, newest first.
    fn filter(&self, installed: &SemVerLike, items: Vec<ManifestItem>) -> Vec<ManifestItem>;
}

impl<F> ItemFilter for F
where
    F: Fn(&SemVerLike, Vec<ManifestItem>) -> Vec<ManifestItem> + Send + Sync,
{
    fn filter(&self, installed: &SemVerLike, items: Vec<ManifestItem>) -> Vec<ManifestItem> {
        self(installed, items)
    }
}

/// Channel filter over explicit and version-derived channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFilter {
    /// Channels the user opted into, matched case-insensitively
    pub channel_search_names: Vec<String>,
    /// Drop items not newer than the installed version
    pub remove_older_items: bool,
    /// Keep pre-release items whose derived channel was not searched for
    pub keep_items_with_no_channel_info: bool,
}

impl Default for ChannelFilter {
    fn default() -> Self {
        Self {
            channel_search_names: Vec::new(),
            remove_older_items: true,
            keep_items_with_no_channel_info: false,
        }
    }
}

impl ChannelFilter {
    /// Filter searching the given channels.
    pub fn new<I, S>(channel_search_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channel_search_names: channel_search_names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Builder-style setter for `remove_older_items`.
    pub fn remove_older_items(mut self, remove: bool) -> Self {
        self.remove_older_items = remove;
        self
    }

    /// Builder-style setter for `keep_items_with_no_channel_info`.
    pub fn keep_items_with_no_channel_info(mut self, keep: bool) -> Self {
        self.keep_items_with_no_channel_info = keep;
        self
    }

    fn searches(&self, channel: &str) -> bool {
        self.channel_search_names
            .iter()
            .any(|name| name.trim().eq_ignore_ascii_case(channel))
    }

    /// Whether `item` belongs to a searched channel (or is stable).
    pub fn accepts(&self, item: &ManifestItem) -> bool {
        if let Some(channel) = item.explicit_channel() {
            return self.searches(channel);
        }
        if !item.version.is_prerelease() {
            return true;
        }
        if self.channel_search_names.is_empty() {
            return false;
        }
        match derived_channel(&item.version) {
            Some(channel) if self.searches(&channel) => true,
            _ => self.keep_items_with_no_channel_info,
        }
    }

    /// Apply the channel rules, drop old items if configured, sort newest first
    /// and collapse equal versions to their first occurrence.
    pub fn filtered_items(
        &self,
        installed: &SemVerLike,
        items: Vec<ManifestItem>,
    ) -> Vec<ManifestItem> {
        let total = items.len();
        let mut kept: Vec<ManifestItem> = items
            .into_iter()
            .filter(|item| {
                let accepted = self.accepts(item);
                if !accepted {
                    tracing::debug!(version = %item.version, channel = ?item.channel, "Item not in searched channels");
                }
                accepted
            })
            .filter(|item| !self.remove_older_items || item.version > *installed)
            .collect();

        kept.sort_by(|a, b| b.version.cmp(&a.version));
        kept.dedup_by(|later, earlier| later.version == earlier.version);

        tracing::debug!(
            total,
            kept = kept.len(),
            installed = %installed,
            channels = ?self.channel_search_names,
            "Channel filter applied"
        );
        kept
    }
}

impl ItemFilter for ChannelFilter {
    fn filter(&self, installed: &SemVerLike, items: Vec<ManifestItem>) -> Vec<ManifestItem> {
        self.filtered_items(installed, items)
    }
}

/// [`ItemFilter`] backed by a [`Reducer`], usually built with [`mix`].
#[derive(Clone)]
pub struct ReducerFilter {
    reducer: Reducer,
}

impl ReducerFilter {
    pub fn new(reducer: Reducer) -> Self {
        Self { reducer }
    }
}

impl From<Reducer> for ReducerFilter {
    fn from(reducer: Reducer) -> Self {
        Self::new(reducer)
    }
}

impl ItemFilter for ReducerFilter {
    fn filter(&self, installed: &SemVerLike, items: Vec<ManifestItem>) -> Vec<ManifestItem> {
        (self.reducer)(installed, items)
    }
}

impl std::fmt::Debug for ReducerFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReducerFilter").finish_non_exhaustive()
    }
}

/// Channel implied by a version's first pre-release identifier, lowercased.
///
/// `1.1-beta1` -> `beta`, `1.0-alpha.1` -> `alpha`, `1.0-1` -> `None`.
pub fn derived_channel(version: &SemVerLike) -> Option<String> {
    let first = version.prerelease_identifiers().into_iter().next()?;
    let name: String = first
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_lowercase();
    (!name.is_empty()).then_some(name)
}

/// Keep items whose trimmed version equals their version (no pre-release).
pub fn only_retail_versions() -> Reducer {
    only_retail_versions_with(default_version_trimmer())
}

/// [`only_retail_versions`] with a custom trimmer.
pub fn only_retail_versions_with(trimmer: VersionTrimmer) -> Reducer {
    Arc::new(move |_installed: &SemVerLike, items: Vec<ManifestItem>| -> Vec<ManifestItem> {
        items
            .into_iter()
            .filter(|item| trimmer(&item.version) == item.version)
            .collect()
    })
}

/// Keep items whose trimmed version differs from their version.
pub fn only_pre_released_versions() -> Reducer {
    only_pre_released_versions_with(default_version_trimmer())
}

/// [`only_pre_released_versions`] with a custom trimmer.
pub fn only_pre_released_versions_with(trimmer: VersionTrimmer) -> Reducer {
    Arc::new(move |_installed: &SemVerLike, items: Vec<ManifestItem>| -> Vec<ManifestItem> {
        items
            .into_iter()
            .filter(|item| trimmer(&item.version) != item.version)
            .collect()
    })
}

/// Drop items whose version is not newer than the installed one.
pub fn remove_older_versions() -> Reducer {
    Arc::new(|installed: &SemVerLike, items: Vec<ManifestItem>| -> Vec<ManifestItem> {
        items
            .into_iter()
            .filter(|item| item.version > *installed)
            .collect()
    })
}

/// Stable sort, newest first.
pub fn newer_first() -> Reducer {
    Arc::new(|_installed: &SemVerLike, mut items: Vec<ManifestItem>| -> Vec<ManifestItem> {
        items.sort_by(|a, b| b.version.cmp(&a.version));
        items
    })
}

/// Keep items built for the given operating system family.
pub fn only_os(family: OsFamily) -> Reducer {
    Arc::new(move |_installed: &SemVerLike, items: Vec<ManifestItem>| -> Vec<ManifestItem> {
        items
            .into_iter()
            .filter(|item| item.is_for(family))
            .collect()
    })
}

/// Run reducers in order, each receiving the previous output.
pub fn mix(reducers: Vec<Reducer>) -> Reducer {
    Arc::new(move |installed: &SemVerLike, items: Vec<ManifestItem>| -> Vec<ManifestItem> {
        reducers
            .iter()
            .fold(items, |items, reducer| reducer(installed, items))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SemVerLike {
        SemVerLike::parse(s)
    }

    fn items(versions: &[&str]) -> Vec<ManifestItem> {
        versions
            .iter()
            .map(|version| ManifestItem::new(version).unwrap())
            .collect()
    }

    fn versions(items: &[ManifestItem]) -> Vec<&str> {
        items.iter().map(|i| i.version.as_str()).collect()
    }

    #[test]
    fn test_alpha_channel_scenario() {
        let filter = ChannelFilter::new(["alpha"]);
        let result = filter.filtered_items(
            &v("1.0.0"),
            items(&["2.0-beta1", "1.1-beta1", "1.1-alpha1", "1.0.0"]),
        );
        assert_eq!(versions(&result), vec!["1.1-alpha1"]);
    }

    #[test]
    fn test_empty_search_names_excludes_prereleases() {
        let mut list = items(&["2.0-beta1", "1.5", "1.2"]);
        list[2].channel = Some("beta".to_string());
        let result = ChannelFilter::default().filtered_items(&v("1.0"), list);
        assert_eq!(versions(&result), vec!["1.5"]);
    }

    #[test]
    fn test_explicit_channel_wins_over_suffix() {
        let mut list = items(&["1.3-beta1", "1.2"]);
        list[0].channel = Some("Nightly".to_string());
        list[1].channel = Some("beta".to_string());

        let result = ChannelFilter::new(["beta"]).filtered_items(&v("1.0"), list.clone());
        assert_eq!(versions(&result), vec!["1.2"]);

        let result = ChannelFilter::new(["nightly"]).filtered_items(&v("1.0"), list);
        assert_eq!(versions(&result), vec!["1.3-beta1"]);
    }

    #[test]
    fn test_keep_items_with_no_channel_info() {
        let list = items(&["1.3-rc1", "1.2-beta2", "1.1"]);
        let strict = ChannelFilter::new(["beta"]);
        assert_eq!(
            versions(&strict.filtered_items(&v("1.0"), list.clone())),
            vec!["1.2-beta2", "1.1"]
        );

        let lenient = ChannelFilter::new(["beta"]).keep_items_with_no_channel_info(true);
        assert_eq!(
            versions(&lenient.filtered_items(&v("1.0"), list)),
            vec!["1.3-rc1", "1.2-beta2", "1.1"]
        );
    }

    #[test]
    fn test_remove_older_items_toggle() {
        let list = items(&["0.9", "1.0", "1.1"]);
        let filter = ChannelFilter::default().remove_older_items(false);
        assert_eq!(
            versions(&filter.filtered_items(&v("1.0"), list.clone())),
            vec!["1.1", "1.0", "0.9"]
        );
        assert_eq!(
            versions(&ChannelFilter::default().filtered_items(&v("1.0"), list)),
            vec!["1.1"]
        );
    }

    #[test]
    fn test_duplicates_collapse_to_first() {
        let mut list = items(&["1.1", "1.1.0", "1.2"]);
        list[0].title = "first".to_string();
        list[1].title = "second".to_string();
        let result = ChannelFilter::default().filtered_items(&v("1.0"), list);
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].title, "first");
    }

    #[test]
    fn test_channel_matching_is_case_insensitive() {
        let result = ChannelFilter::new(["BETA"]).filtered_items(&v("1.0"), items(&["1.1-Beta.3"]));
        assert_eq!(versions(&result), vec!["1.1-Beta.3"]);
    }

    #[test]
    fn test_derived_channel() {
        assert_eq!(derived_channel(&v("1.1-beta1")).as_deref(), Some("beta"));
        assert_eq!(derived_channel(&v("1.0-alpha.1")).as_deref(), Some("alpha"));
        assert_eq!(derived_channel(&v("2.0-RC2+b5")).as_deref(), Some("rc"));
        assert_eq!(derived_channel(&v("1.0-1")), None);
        assert_eq!(derived_channel(&v("1.0+build")), None);
        assert_eq!(derived_channel(&v("1.0")), None);
    }

    #[test]
    fn test_numeric_prerelease_has_no_channel_info() {
        let list = items(&["1.0-1"]);
        assert!(ChannelFilter::new(["beta"])
            .filtered_items(&v("0.9"), list.clone())
            .is_empty());
        assert!(ChannelFilter::default()
            .filtered_items(&v("0.9"), list.clone())
            .is_empty());

        let lenient = ChannelFilter::new(["beta"]).keep_items_with_no_channel_info(true);
        assert_eq!(versions(&lenient.filtered_items(&v("0.9"), list)), vec!["1.0-1"]);
    }

    #[test]
    fn test_only_retail_versions_scenario() {
        let reducer = only_retail_versions();
        let result = reducer(&v("2.2"), items(&["2.1-prerelease", "2.0", "1.3"]));
        assert_eq!(result[0].version.as_str(), "2.0");
        assert_eq!(versions(&result), vec!["2.0", "1.3"]);
    }

    #[test]
    fn test_only_pre_released_versions() {
        let reducer = only_pre_released_versions();
        let result = reducer(&v("1.0"), items(&["2.1-beta", "2.0", "1.9+build.4"]));
        assert_eq!(versions(&result), vec!["2.1-beta"]);
    }

    #[test]
    fn test_mix_threads_in_order() {
        let pipeline = mix(vec![
            only_retail_versions(),
            remove_older_versions(),
            newer_first(),
        ]);
        let result = pipeline(&v("1.0"), items(&["0.5", "1.2", "1.4-beta", "1.3", "1.0"]));
        assert_eq!(versions(&result), vec!["1.3", "1.2"]);
    }

    #[test]
    fn test_only_os() {
        let mut list = items(&["1.2", "1.1", "1.0"]);
        list[0].operating_system = "macos".to_string();
        list[1].operating_system = "linux-x64".to_string();
        let result = only_os(OsFamily::Linux)(&v("0.1"), list);
        assert_eq!(versions(&result), vec!["1.1"]);
    }

    #[test]
    fn test_item_filter_implementations() {
        let installed = v("1.0");
        let closure = |_: &SemVerLike, items: Vec<ManifestItem>| -> Vec<ManifestItem> {
            items.into_iter().take(1).collect()
        };
        let filters: Vec<Box<dyn ItemFilter>> = vec![
            Box::new(ChannelFilter::default()),
            Box::new(ReducerFilter::new(newer_first())),
            Box::new(closure),
        ];
        for filter in &filters {
            let result = filter.filter(&installed, items(&["1.1", "1.2"]));
            assert!(!result.is_empty());
        }
    }
}
