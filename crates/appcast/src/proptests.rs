//! Property-based tests for appcast.
//!
//! These tests use proptest to verify correctness properties across
//! randomly generated inputs.
//!
//! # Properties Tested
//!
//! - Property 1: Codec Round Trip (XML and JSON)
//! - Property 2: Sorted Output After Deserialize
//! - Property 3: Version Ordering Is a Total Order
//! - Property 4: Trimmer Idempotence
//! - Property 5: Channel Filter Output Shape
//! - Property 6: Signature Verification

#![cfg(test)]

use chrono::{TimeZone, Utc};
use ed25519_dalek::SigningKey;
use proptest::prelude::*;

use crate::codec::{CodecKind, ManifestCodec};
use crate::filter::ChannelFilter;
use crate::item::ManifestItem;
use crate::manifest::Manifest;
use crate::signature::{
    Ed25519Signer, Ed25519Verifier, SecurityMode, SignatureVerificationResult, SignatureVerifier,
};
use crate::version::{default_version_trimmer, SemVerLike};

// =============================================================================
// Generators
// =============================================================================

/// Generate a version string with optional pre-release and build suffixes.
fn arb_version() -> impl Strategy<Value = String> {
    "[0-9]{1,3}(\\.[0-9]{1,3}){0,3}(-(alpha|beta|rc|[0-9]{1,2})(\\.?[0-9]{1,2}){0,2})?(\\+[a-z0-9]{1,4})?"
}

/// Generate a token with no surrounding whitespace.
fn arb_token() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_./:=-]{1,16}"
}

/// Generate free text with characters that need escaping and untrimmed
/// whitespace, like an indented Markdown block.
fn arb_text() -> impl Strategy<Value = String> {
    "[ \n\t]{0,3}[A-Za-z0-9 <>&\"',.!#*\n\t-]{0,24}[ \n]{0,3}"
}

/// Generate a non-blank optional free text.
fn arb_opt_text() -> impl Strategy<Value = Option<String>> {
    prop::option::of(arb_text().prop_filter("non-blank", |s| !s.trim().is_empty()))
}

/// Generate a whole-second UTC timestamp between 1970 and 2100.
fn arb_date() -> impl Strategy<Value = Option<chrono::DateTime<Utc>>> {
    prop::option::of((0i64..4_102_444_800).prop_map(|secs| {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }))
}

/// Generate a fully populated item.
fn arb_item() -> impl Strategy<Value = ManifestItem> {
    (
        (
            arb_version(),
            arb_text(),
            prop::option::of(arb_token()),
            prop::option::of(arb_token()),
            prop::option::of(arb_token()),
            prop::option::of(arb_token()),
            prop::option::of(arb_token()),
        ),
        (
            arb_opt_text(),
            arb_date(),
            any::<bool>(),
            any::<i64>(),
            "[a-z]{1,8}(-x64)?",
            "[a-z]{1,10}/[a-z0-9.+-]{1,12}",
            prop::option::of(" ?[a-z]{1,8} ?"),
        ),
    )
        .prop_map(
            |(
                (version, title, short_version, link, signature, notes_link, notes_signature),
                (description, date, critical, size, os, mime, channel),
            )| {
                let mut item = ManifestItem::new(&version).unwrap();
                item.title = title;
                item.short_version = short_version;
                item.download_link = link;
                item.download_signature = signature;
                // A notes signature is only carried alongside its link.
                item.release_notes_signature = notes_link.as_ref().and(notes_signature);
                item.release_notes_link = notes_link;
                item.description = description;
                item.publication_date = date;
                item.is_critical = critical;
                item.size = size;
                item.operating_system = os;
                item.mime_type = mime;
                item.channel = channel;
                item
            },
        )
}

/// Generate a manifest whose items are already in canonical order.
fn arb_manifest() -> impl Strategy<Value = Manifest> {
    (arb_text(), prop::collection::vec(arb_item(), 0..8)).prop_map(|(title, items)| {
        let mut manifest = Manifest::new(title);
        manifest.items = items;
        manifest.sort_items();
        manifest
    })
}

/// Generate a random Ed25519 signing key from 32 random bytes.
fn arb_signing_key() -> impl Strategy<Value = SigningKey> {
    prop::array::uniform32(any::<u8>()).prop_map(|bytes| SigningKey::from_bytes(&bytes))
}

// =============================================================================
// Property 1: Codec Round Trip
//
// *For any* manifest, decoding its encoding SHALL reproduce every item field
// and the item order, in both wire formats.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_xml_round_trip(manifest in arb_manifest()) {
        let codec = CodecKind::Xml.codec();
        let bytes = codec.serialize(&manifest).unwrap();
        let back = codec.deserialize(&bytes).unwrap();
        prop_assert_eq!(back.title, manifest.title);
        prop_assert_eq!(back.items, manifest.items);
    }

    #[test]
    fn prop_json_round_trip(manifest in arb_manifest()) {
        let codec = CodecKind::Json.codec();
        let bytes = codec.serialize(&manifest).unwrap();
        let back = codec.deserialize(&bytes).unwrap();
        prop_assert_eq!(back.title, manifest.title);
        prop_assert_eq!(back.items, manifest.items);
    }
}

// =============================================================================
// Property 2: Sorted Output After Deserialize
//
// *For any* document order, decoded items SHALL be in descending version
// order with ties kept in document order.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_deserialize_sorts(versions in prop::collection::vec(arb_version(), 0..12)) {
        let mut manifest = Manifest::new("App");
        manifest.items = versions
            .iter()
            .enumerate()
            .map(|(index, version)| {
                let mut item = ManifestItem::new(version).unwrap();
                item.title = index.to_string();
                item
            })
            .collect();

        for kind in [CodecKind::Xml, CodecKind::Json] {
            let codec = kind.codec();
            let back = codec.deserialize(&codec.serialize(&manifest).unwrap()).unwrap();
            prop_assert!(back.is_sorted());
            for pair in back.items.windows(2) {
                if pair[0].version == pair[1].version {
                    let first: usize = pair[0].title.parse().unwrap();
                    let second: usize = pair[1].title.parse().unwrap();
                    prop_assert!(first < second, "ties must keep document order");
                }
            }
        }
    }
}

// =============================================================================
// Property 3: Version Ordering Is a Total Order
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_ordering_antisymmetric(a in arb_version(), b in arb_version()) {
        let (a, b) = (SemVerLike::parse(&a), SemVerLike::parse(&b));
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        prop_assert_eq!(a == b, a.cmp(&b) == std::cmp::Ordering::Equal);
    }

    #[test]
    fn prop_ordering_transitive(a in arb_version(), b in arb_version(), c in arb_version()) {
        let mut versions = [SemVerLike::parse(&a), SemVerLike::parse(&b), SemVerLike::parse(&c)];
        versions.sort();
        prop_assert!(versions[0] <= versions[1]);
        prop_assert!(versions[1] <= versions[2]);
        prop_assert!(versions[0] <= versions[2]);
    }

    #[test]
    fn prop_prerelease_below_release(core in "[0-9]{1,3}(\\.[0-9]{1,3}){0,2}", pre in "[a-z0-9]{1,6}") {
        let release = SemVerLike::parse(&core);
        let prerelease = SemVerLike::parse(&format!("{core}-{pre}"));
        prop_assert!(prerelease < release);
    }

    #[test]
    fn prop_any_string_parses(raw in ".{0,32}") {
        let version = SemVerLike::parse(&raw);
        prop_assert_eq!(version.as_str(), raw.trim());
        prop_assert_eq!(version.cmp(&version), std::cmp::Ordering::Equal);
    }
}

// =============================================================================
// Property 4: Trimmer Idempotence
// =============================================================================

proptest! {
    #[test]
    fn prop_default_trimmer_idempotent(raw in arb_version()) {
        let trim = default_version_trimmer();
        let once = trim(&SemVerLike::parse(&raw));
        let twice = trim(&once);
        prop_assert_eq!(once.as_str(), twice.as_str());
        prop_assert!(!once.is_prerelease());
    }
}

// =============================================================================
// Property 5: Channel Filter Output Shape
//
// *For any* item list, the filtered output SHALL be strictly descending
// (sorted, no duplicate versions) and newer than the installed version.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_channel_filter_output(
        installed in arb_version(),
        versions in prop::collection::vec(arb_version(), 0..16),
        channels in prop::collection::vec(prop_oneof![Just("alpha"), Just("beta"), Just("rc")], 0..3),
    ) {
        let installed = SemVerLike::parse(&installed);
        let items: Vec<ManifestItem> = versions
            .iter()
            .map(|v| ManifestItem::new(v).unwrap())
            .collect();

        let result = ChannelFilter::new(channels).filtered_items(&installed, items);
        for pair in result.windows(2) {
            prop_assert!(pair[0].version > pair[1].version);
        }
        for item in &result {
            prop_assert!(item.version > installed);
        }
    }
}

// =============================================================================
// Property 6: Signature Verification
//
// *For any* key and payload, a signature from that key SHALL be Valid and a
// signature from a different key SHALL be Invalid.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_signature_verification(
        key1 in arb_signing_key(),
        key2 in arb_signing_key(),
        payload in prop::collection::vec(any::<u8>(), 0..2048),
    ) {
        prop_assume!(key1.to_bytes() != key2.to_bytes());

        let signer = Ed25519Signer::from_secret_key_str(&hex::encode(key1.to_bytes())).unwrap();
        let other = Ed25519Signer::from_secret_key_str(&hex::encode(key2.to_bytes())).unwrap();
        let verifier = Ed25519Verifier::new(SecurityMode::Strict, Some(&signer.public_key_string()));

        prop_assert_eq!(
            verifier.verify(Some(&signer.sign(&payload)), &payload),
            SignatureVerificationResult::Valid
        );
        prop_assert_eq!(
            verifier.verify(Some(&other.sign(&payload)), &payload),
            SignatureVerificationResult::Invalid
        );
    }
}
