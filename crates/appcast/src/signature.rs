//! Signature verification for app casts, payloads and release notes.
//!
//! # Security
//!
//! Whether a missing key or a missing signature is tolerated is decided by
//! [`SecurityMode`] and nothing else. A signature that fails the cryptographic
//! check is always [`SignatureVerificationResult::Invalid`], whatever the mode.
//!
//! Ed25519 is the shipped scheme. Keys are written as
//! `ed25519:<hex_or_base64_32_bytes>` (the prefix is optional) and signatures
//! as base64 of the 64 signature bytes.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::UpdateError;

const KEY_PREFIX: &str = "ed25519:";

/// How strictly missing keys and signatures are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Verify when both key and signature are present, otherwise accept unchecked
    Unsafe,
    /// Verify whenever a key is configured
    UseIfPossible,
    /// Always require a key and a valid signature
    #[default]
    Strict,
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsafe => write!(f, "unsafe"),
            Self::UseIfPossible => write!(f, "use_if_possible"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

impl std::str::FromStr for SecurityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "unsafe" => Ok(Self::Unsafe),
            "use_if_possible" => Ok(Self::UseIfPossible),
            "strict" => Ok(Self::Strict),
            _ => Err(format!("Unknown security mode: {s}")),
        }
    }
}

/// Outcome of a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureVerificationResult {
    /// Signature checked and matches
    Valid,
    /// Signature missing while required, or does not match
    Invalid,
    /// No check was possible and the mode allows that
    Unchecked,
}

impl SignatureVerificationResult {
    /// Whether the checked data may be used.
    pub fn is_acceptable(self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

impl std::fmt::Display for SignatureVerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Invalid => write!(f, "invalid"),
            Self::Unchecked => write!(f, "unchecked"),
        }
    }
}

/// A signature scheme together with the policy for missing material.
pub trait SignatureVerifier: Send + Sync {
    /// Active policy.
    fn security_mode(&self) -> SecurityMode;

    /// Whether usable key material is loaded.
    fn has_valid_key_information(&self) -> bool;

    /// Cryptographic check of `signature` over `data`.
    fn verify_signature(&self, signature: &str, data: &[u8]) -> bool;

    /// Whether items and app casts must carry signatures under the current policy.
    fn signature_needed(&self) -> bool {
        match self.security_mode() {
            SecurityMode::Strict => true,
            SecurityMode::UseIfPossible => self.has_valid_key_information(),
            SecurityMode::Unsafe => false,
        }
    }

    /// Apply the policy for `mode` and, when both key and signature are present,
    /// the cryptographic check.
    fn verify(&self, signature: Option<&str>, data: &[u8]) -> SignatureVerificationResult {
        let signature = signature.map(str::trim).filter(|s| !s.is_empty());
        let has_key = self.has_valid_key_information();
        let mode = self.security_mode();

        let signature = match (mode, has_key, signature) {
            (_, true, Some(signature)) => signature,
            (SecurityMode::Strict, _, _) => {
                tracing::warn!(has_key, "Signature required but key or signature is missing");
                return SignatureVerificationResult::Invalid;
            }
            (SecurityMode::UseIfPossible, true, None) => {
                tracing::warn!("Key is configured but data carries no signature");
                return SignatureVerificationResult::Invalid;
            }
            (SecurityMode::UseIfPossible, false, _) | (SecurityMode::Unsafe, _, _) => {
                tracing::debug!(%mode, has_key, "Signature not checked");
                return SignatureVerificationResult::Unchecked;
            }
        };

        if self.verify_signature(signature, data) {
            SignatureVerificationResult::Valid
        } else {
            tracing::warn!(len = data.len(), "Signature does not match data");
            SignatureVerificationResult::Invalid
        }
    }

    /// [`verify`](Self::verify) over the contents of a file.
    fn verify_file(
        &self,
        signature: Option<&str>,
        path: &Path,
    ) -> Result<SignatureVerificationResult, UpdateError> {
        let data = std::fs::read(path)?;
        Ok(self.verify(signature, &data))
    }

    /// [`verify`](Self::verify) over UTF-8 text.
    fn verify_str(&self, signature: Option<&str>, text: &str) -> SignatureVerificationResult {
        self.verify(signature, text.as_bytes())
    }
}

/// Ed25519 verifier with an optional pinned public key.
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    mode: SecurityMode,
    key: Option<VerifyingKey>,
}

impl Ed25519Verifier {
    /// Create a verifier from an optional key string.
    ///
    /// A key that fails to decode is logged and treated as absent, so
    /// [`SecurityMode::Strict`] still rejects everything.
    pub fn new(mode: SecurityMode, public_key: Option<&str>) -> Self {
        let key = public_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .and_then(|k| match parse_public_key(k) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::error!(error = %e, "Ignoring unusable public key");
                    None
                }
            });
        Self { mode, key }
    }

    /// Verifier with no key material.
    pub fn without_key(mode: SecurityMode) -> Self {
        Self { mode, key: None }
    }

    /// Verifier pinned to an already decoded key.
    pub fn with_key(mode: SecurityMode, key: VerifyingKey) -> Self {
        Self {
            mode,
            key: Some(key),
        }
    }

    /// Read the public key string from a file.
    pub fn from_key_file(mode: SecurityMode, path: &Path) -> Result<Self, UpdateError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(mode, Some(content.trim())))
    }

    /// Change the policy.
    pub fn set_security_mode(&mut self, mode: SecurityMode) {
        self.mode = mode;
    }

    /// The pinned key, if any.
    pub fn public_key(&self) -> Option<&VerifyingKey> {
        self.key.as_ref()
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn security_mode(&self) -> SecurityMode {
        self.mode
    }

    fn has_valid_key_information(&self) -> bool {
        self.key.is_some()
    }

    fn verify_signature(&self, signature: &str, data: &[u8]) -> bool {
        let Some(key) = &self.key else {
            return false;
        };
        match decode_signature(signature) {
            Ok(signature) => key.verify(data, &signature).is_ok(),
            Err(e) => {
                tracing::debug!(error = %e, "Undecodable signature");
                false
            }
        }
    }
}

/// Ed25519 signing key used to produce app cast and payload signatures.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Fresh random key pair.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut rand_core::OsRng),
        }
    }

    /// Load a secret key written as `ed25519:<hex_or_base64_32_bytes>`.
    pub fn from_secret_key_str(s: &str) -> Result<Self, UpdateError> {
        let bytes = decode_key_bytes(s)?;
        Ok(Self {
            key: SigningKey::from_bytes(&bytes),
        })
    }

    /// Read the secret key string from a file.
    pub fn from_key_file(path: &Path) -> Result<Self, UpdateError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_secret_key_str(content.trim())
    }

    /// Base64 signature over `data`.
    pub fn sign(&self, data: &[u8]) -> String {
        BASE64.encode(self.key.sign(data).to_bytes())
    }

    /// Matching public key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Public key in `ed25519:<base64>` form.
    pub fn public_key_string(&self) -> String {
        format!("{KEY_PREFIX}{}", BASE64.encode(self.key.verifying_key().as_bytes()))
    }

    /// Secret key in `ed25519:<base64>` form.
    pub fn secret_key_string(&self) -> String {
        format!("{KEY_PREFIX}{}", BASE64.encode(self.key.to_bytes()))
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &self.public_key_string())
            .finish_non_exhaustive()
    }
}

/// Parse an Ed25519 public key.
///
/// Supports formats:
/// - "ed25519:<hex_encoded_32_bytes>"
/// - "ed25519:<base64_encoded_32_bytes>"
/// - either encoding without the prefix
pub fn parse_public_key(s: &str) -> Result<VerifyingKey, UpdateError> {
    let bytes = decode_key_bytes(s)?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| UpdateError::InvalidKey(format!("invalid Ed25519 public key: {e}")))
}

fn decode_key_bytes(s: &str) -> Result<[u8; 32], UpdateError> {
    let s = s.trim();
    let encoded = s.strip_prefix(KEY_PREFIX).unwrap_or(s);

    // Try hex first
    let data = match hex::decode(encoded) {
        Ok(bytes) => bytes,
        Err(_) => BASE64
            .decode(encoded)
            .map_err(|e| UpdateError::InvalidKey(format!("invalid key encoding: {e}")))?,
    };

    data.try_into()
        .map_err(|_| UpdateError::InvalidKey("Ed25519 key must be 32 bytes".to_string()))
}

fn decode_signature(s: &str) -> Result<Signature, UpdateError> {
    let bytes = BASE64
        .decode(s.trim())
        .map_err(|e| UpdateError::SignatureVerificationFailed(format!("invalid base64: {e}")))?;
    Ok(Signature::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &[u8] = b"release payload";

    fn signer() -> Ed25519Signer {
        Ed25519Signer::from_secret_key_str(&format!("ed25519:{}", hex::encode([7u8; 32]))).unwrap()
    }

    fn verifier(mode: SecurityMode) -> Ed25519Verifier {
        Ed25519Verifier::new(mode, Some(&signer().public_key_string()))
    }

    #[test]
    fn test_strict_without_key_is_invalid() {
        let verifier = Ed25519Verifier::without_key(SecurityMode::Strict);
        assert_eq!(verifier.verify(Some(""), DATA), SignatureVerificationResult::Invalid);
        assert_eq!(verifier.verify(None, DATA), SignatureVerificationResult::Invalid);
        assert_eq!(
            verifier.verify(Some(&signer().sign(DATA)), DATA),
            SignatureVerificationResult::Invalid
        );
        assert!(verifier.signature_needed());
    }

    #[test]
    fn test_unsafe_without_material_is_unchecked() {
        let verifier = Ed25519Verifier::without_key(SecurityMode::Unsafe);
        assert_eq!(verifier.verify(None, DATA), SignatureVerificationResult::Unchecked);
        assert!(!verifier.signature_needed());

        let keyed = self::verifier(SecurityMode::Unsafe);
        assert_eq!(keyed.verify(None, DATA), SignatureVerificationResult::Unchecked);
        assert_eq!(
            keyed.verify(Some("AAAA"), DATA),
            SignatureVerificationResult::Invalid
        );
    }

    #[test]
    fn test_use_if_possible_policy() {
        let keyless = Ed25519Verifier::without_key(SecurityMode::UseIfPossible);
        assert_eq!(
            keyless.verify(Some(&signer().sign(DATA)), DATA),
            SignatureVerificationResult::Unchecked
        );
        assert!(!keyless.signature_needed());

        let keyed = verifier(SecurityMode::UseIfPossible);
        assert!(keyed.signature_needed());
        assert_eq!(keyed.verify(None, DATA), SignatureVerificationResult::Invalid);
        assert_eq!(
            keyed.verify(Some(&signer().sign(DATA)), DATA),
            SignatureVerificationResult::Valid
        );
    }

    #[test]
    fn test_strict_with_key() {
        let verifier = verifier(SecurityMode::Strict);
        let signature = signer().sign(DATA);
        assert_eq!(verifier.verify(Some(&signature), DATA), SignatureVerificationResult::Valid);
        assert_eq!(
            verifier.verify(Some(&signature), b"tampered"),
            SignatureVerificationResult::Invalid
        );
        assert_eq!(verifier.verify(Some("   "), DATA), SignatureVerificationResult::Invalid);
        assert_eq!(
            verifier.verify(Some("not base64!"), DATA),
            SignatureVerificationResult::Invalid
        );
    }

    #[test]
    fn test_bad_key_is_treated_as_absent() {
        let verifier = Ed25519Verifier::new(SecurityMode::Strict, Some("ed25519:00000000"));
        assert!(!verifier.has_valid_key_information());
        assert_eq!(
            verifier.verify(Some(&signer().sign(DATA)), DATA),
            SignatureVerificationResult::Invalid
        );
    }

    #[test]
    fn test_parse_public_key_formats() {
        let signer = signer();
        let raw = signer.verifying_key().to_bytes();

        let from_hex = parse_public_key(&format!("ed25519:{}", hex::encode(raw))).unwrap();
        let from_b64 = parse_public_key(&signer.public_key_string()).unwrap();
        let bare = parse_public_key(&BASE64.encode(raw)).unwrap();
        assert_eq!(from_hex, from_b64);
        assert_eq!(from_b64, bare);

        assert!(matches!(
            parse_public_key("ed25519:00000000"),
            Err(UpdateError::InvalidKey(_))
        ));
        assert!(parse_public_key("ed25519:???").is_err());
    }

    #[test]
    fn test_secret_key_string_round_trip() {
        let signer = Ed25519Signer::generate();
        let restored = Ed25519Signer::from_secret_key_str(&signer.secret_key_string()).unwrap();
        assert_eq!(restored.public_key_string(), signer.public_key_string());
        assert_eq!(restored.sign(DATA), signer.sign(DATA));
    }

    #[test]
    fn test_verify_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("app.zip");
        std::fs::write(&path, DATA).unwrap();

        let signature = signer().sign(DATA);
        let result = verifier(SecurityMode::Strict)
            .verify_file(Some(&signature), &path)
            .unwrap();
        assert_eq!(result, SignatureVerificationResult::Valid);

        assert!(verifier(SecurityMode::Strict)
            .verify_file(Some(&signature), &temp_dir.path().join("missing"))
            .is_err());
    }

    #[test]
    fn test_security_mode_parse() {
        assert_eq!("strict".parse::<SecurityMode>().unwrap(), SecurityMode::Strict);
        assert_eq!(
            "use-if-possible".parse::<SecurityMode>().unwrap(),
            SecurityMode::UseIfPossible
        );
        assert_eq!("UNSAFE".parse::<SecurityMode>().unwrap(), SecurityMode::Unsafe);
        assert!("lenient".parse::<SecurityMode>().is_err());
        assert_eq!(SecurityMode::default(), SecurityMode::Strict);
    }
}
