//! Tolerant version model.
//!
//! App casts in the wild carry versions such as `1.2`, `2.0.0.1234`,
//! `1.1-beta1` or `3.0+build.7`, none of which are guaranteed to be valid
//! semantic versions. [`SemVerLike`] accepts every string, keeps it verbatim
//! for display and round-trips, and orders values by:
//!
//! 1. the dotted numeric core, component by component (missing components are 0),
//! 2. pre-release suffix (`-...`) below no suffix,
//! 3. pre-release identifiers per SemVer precedence.
//!
//! Build metadata (`+...`) never participates in ordering.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A version string that may not be strictly SemVer compliant.
///
/// Equality follows ordering, so `1.0 == 1.0.0` and `1.0+a == 1.0+b`.
#[derive(Debug, Clone)]
pub struct SemVerLike {
    /// Trimmed original text
    raw: String,
    /// Byte offset where the suffix (`-` or `+`) begins
    split: usize,
}

impl SemVerLike {
    /// Parse a version string. Never fails.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let split = raw
            .find(|c: char| c == '-' || c == '+')
            .unwrap_or(raw.len());
        Self {
            raw: raw.to_string(),
            split,
        }
    }

    /// The full version text as parsed.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Dotted numeric core (everything before the first `-` or `+`).
    pub fn core(&self) -> &str {
        &self.raw[..self.split]
    }

    /// Raw suffix including its leading `-` or `+`, or an empty string.
    pub fn suffix(&self) -> &str {
        &self.raw[self.split..]
    }

    /// Whether the parsed string was empty.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Whether the version carries a `-prerelease` suffix.
    pub fn is_prerelease(&self) -> bool {
        self.suffix().starts_with('-')
    }

    /// The pre-release part between `-` and an optional `+`.
    pub fn prerelease(&self) -> Option<&str> {
        let rest = self.suffix().strip_prefix('-')?;
        Some(match rest.find('+') {
            Some(idx) => &rest[..idx],
            None => rest,
        })
    }

    /// Build metadata after the first `+`, if any.
    pub fn build(&self) -> Option<&str> {
        let suffix = self.suffix();
        suffix.find('+').map(|idx| &suffix[idx + 1..])
    }

    /// Dot-separated pre-release identifiers.
    pub fn prerelease_identifiers(&self) -> Vec<&str> {
        self.prerelease()
            .map(|pre| pre.split('.').collect())
            .unwrap_or_default()
    }

    /// Copy of this version with the whole suffix removed.
    pub fn without_suffix(&self) -> Self {
        Self::parse(self.core())
    }

    /// Copy of this version with the pre-release removed but build metadata kept.
    pub fn without_prerelease(&self) -> Self {
        match self.build() {
            Some(build) if self.is_prerelease() => {
                Self::parse(&format!("{}+{}", self.core(), build))
            }
            Some(_) => self.clone(),
            None => self.without_suffix(),
        }
    }
}

impl Default for SemVerLike {
    fn default() -> Self {
        Self::parse("")
    }
}

impl FromStr for SemVerLike {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for SemVerLike {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl fmt::Display for SemVerLike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for SemVerLike {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_cores(self.core(), other.core())
            .then_with(|| compare_prerelease(self.prerelease(), other.prerelease()))
    }
}

impl PartialOrd for SemVerLike {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemVerLike {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemVerLike {}

impl Serialize for SemVerLike {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for SemVerLike {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Leading digit run of a core component with leading zeros removed.
///
/// `"007"` -> `"7"`, `"12beta"` -> `"12"`, `"x"` -> `""` (zero).
fn numeric_value(component: &str) -> &str {
    let end = component
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(component.len());
    component[..end].trim_start_matches('0')
}

/// Compare two normalized digit strings of arbitrary length.
fn compare_digits(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_cores(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => {
                let ordering = compare_digits(
                    numeric_value(l.unwrap_or("")),
                    numeric_value(r.unwrap_or("")),
                );
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn is_numeric_identifier(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

fn compare_identifier(a: &str, b: &str) -> Ordering {
    match (is_numeric_identifier(a), is_numeric_identifier(b)) {
        (true, true) => compare_digits(a.trim_start_matches('0'), b.trim_start_matches('0')),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

fn compare_prerelease(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(a), Some(b)) => {
            let mut left = a.split('.');
            let mut right = b.split('.');
            loop {
                match (left.next(), right.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(l), Some(r)) => {
                        let ordering = compare_identifier(l, r);
                        if ordering != Ordering::Equal {
                            return ordering;
                        }
                    }
                }
            }
        }
    }
}

/// Maps a version to its "retail" comparable form.
pub type VersionTrimmer = Arc<dyn Fn(&SemVerLike) -> SemVerLike + Send + Sync>;

/// Trimmer that drops the whole suffix: `1.0-alpha.1+b7` -> `1.0`.
pub fn default_version_trimmer() -> VersionTrimmer {
    Arc::new(SemVerLike::without_suffix)
}

/// Trimmer that drops the pre-release but keeps build metadata: `1.0-rc.1+b7` -> `1.0+b7`.
pub fn keep_build_metadata_trimmer() -> VersionTrimmer {
    Arc::new(SemVerLike::without_prerelease)
}
