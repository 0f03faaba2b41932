//! # appcast
//!
//! App cast update client: decides whether a newer, trusted release exists
//! for an installed application.
//!
//! This crate handles:
//! - Tolerant version ordering for non-strict version strings
//! - RSS (sparkle namespace) and JSON app cast codecs
//! - Channel filtering and composable item reducers
//! - Ed25519 signature verification under a configurable security mode
//! - The update check itself, with cancellation and release notes fetching
//!
//! ## Security
//!
//! - In strict mode nothing is offered without a pinned key and valid signatures
//! - App casts can carry a detached signature at `<url>.signature`
//! - Payloads are verified before they are written to disk
//! - An invalid signature is never downgraded, whatever the mode

pub mod codec;
pub mod config;
pub mod download;
pub mod error;
pub mod filter;
pub mod item;
pub mod manifest;
#[cfg(test)]
mod proptests;
pub mod release_notes;
pub mod resolver;
pub mod signature;
pub mod version;

// Re-export main types for convenience
pub use codec::{CodecKind, JsonCodec, ManifestCodec, XmlCodec};
pub use config::{
    is_check_due, ConfigSnapshot, Configuration, FileConfiguration, InMemoryConfiguration,
    ManifestFormat, UpdateConfig,
};
pub use download::{DataDownloader, HttpDownloader, LocalFileDownloader, MemoryDownloader};
pub use error::UpdateError;
pub use filter::{mix, ChannelFilter, ItemFilter, Reducer, ReducerFilter};
pub use item::{ManifestItem, OsFamily};
pub use manifest::Manifest;
pub use release_notes::{ItemReleaseNotes, ReleaseNotes, ReleaseNotesFetcher};
pub use resolver::{ResolverState, UpdateCheck, UpdateResolver, UpdateStatus};
pub use signature::{
    Ed25519Signer, Ed25519Verifier, SecurityMode, SignatureVerificationResult, SignatureVerifier,
};
pub use version::{SemVerLike, VersionTrimmer};
