//! Key derivation and ownership.
//!
//! This module owns two responsibilities:
//! 1. Turning the configured secret into a 256-bit field key, either by
//!    using it directly as raw key material or by stretching a passphrase
//!    with PBKDF2-HMAC-SHA256.
//! 2. Holding the active key and its version in a type that is opaque,
//!    non-cloneable and zeroised on drop.
//!
//! ## Derive-vs-raw rule
//!
//! ```text
//! base64_decode(secret) yields >= 32 bytes  ->  first 32 bytes are the key
//! otherwise                                 ->  PBKDF2(secret, salt, 100_000) -> 32 bytes
//! ```
//!
//! Surrounding whitespace is trimmed first. Decoding accepts the standard
//! and URL-safe alphabets, with or without padding, so one raw key yields
//! the same field key however it was exported.
//!
//! The key lives in memory only. It is never persisted and never logged.

use std::num::NonZeroU32;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use ring::pbkdf2;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{self, KEY_LEN};
use crate::error::{IncidentError, Result};

/// PBKDF2 iteration count for passphrase secrets.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt used when the caller does not configure one.
pub const DEFAULT_KDF_SALT: &str = "incident-vault.field-key.v1";

const RAW_KEY_CONFIG: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

/// Engines tried, in order, when reading a secret as raw key material.
const RAW_KEY_ENGINES: [GeneralPurpose; 2] = [
    GeneralPurpose::new(&alphabet::STANDARD, RAW_KEY_CONFIG),
    GeneralPurpose::new(&alphabet::URL_SAFE, RAW_KEY_CONFIG),
];

fn decode_raw_key(secret: &str) -> Option<[u8; KEY_LEN]> {
    RAW_KEY_ENGINES.iter().find_map(|engine| {
        let mut raw = engine.decode(secret).ok()?;
        let key = if raw.len() >= KEY_LEN {
            let mut bytes = [0u8; KEY_LEN];
            bytes.copy_from_slice(&raw[..KEY_LEN]);
            Some(bytes)
        } else {
            None
        };
        raw.zeroize();
        key
    })
}

// ---------------------------------------------------------------------------
// Field key
// ---------------------------------------------------------------------------

/// A 256-bit field encryption key.
///
/// - Not `Clone`. Cannot be duplicated without explicit conversion.
/// - Zeroised on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct FieldKey {
    bytes: [u8; KEY_LEN],
}

impl FieldKey {
    /// Construct a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Apply the derive-vs-raw rule to `secret`.
    pub fn from_secret(secret: &str, salt: &str) -> Result<Self> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(IncidentError::Config("encryption secret is empty".into()));
        }

        if let Some(bytes) = decode_raw_key(secret) {
            return Ok(Self { bytes });
        }

        let iterations = NonZeroU32::new(PBKDF2_ITERATIONS)
            .ok_or_else(|| IncidentError::Config("invalid iteration count".into()))?;
        let mut bytes = [0u8; KEY_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt.as_bytes(),
            secret.as_bytes(),
            &mut bytes,
        );
        Ok(Self { bytes })
    }

    /// Borrow the raw key bytes for encrypt/decrypt calls.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Key manager
// ---------------------------------------------------------------------------

/// Owns the active field key and its version.
///
/// Constructed once at startup and handed to every component that needs it.
/// The key is immutable after `initialize`; rotation is a separate offline
/// job that constructs a second manager for the new key.
#[derive(Debug, Default)]
pub struct KeyManager {
    active: Option<(FieldKey, u8)>,
}

impl KeyManager {
    /// An uninitialized manager. Every key request fails until `initialize`.
    pub fn new() -> Self {
        Self { active: None }
    }

    /// Build and initialize in one step.
    pub fn from_secret(secret: &str, version: u8, salt: &str) -> Result<Self> {
        let mut manager = Self::new();
        manager.initialize(secret, version, salt)?;
        Ok(manager)
    }

    /// Install the active key. Fails with `Config` if `secret` is empty.
    pub fn initialize(&mut self, secret: &str, version: u8, salt: &str) -> Result<()> {
        let key = FieldKey::from_secret(secret, salt)?;
        self.active = Some((key, version));
        tracing::info!(key_version = version, "field encryption key initialized");
        Ok(())
    }

    /// Install an explicit key.
    pub fn with_key(key: FieldKey, version: u8) -> Self {
        Self {
            active: Some((key, version)),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    /// The active key and its version.
    pub fn active_key(&self) -> Result<(&FieldKey, u8)> {
        self.active
            .as_ref()
            .map(|(key, version)| (key, *version))
            .ok_or(IncidentError::NotInitialized)
    }

    pub fn key_version(&self) -> Result<u8> {
        self.active_key().map(|(_, version)| version)
    }

    /// Encrypt under the active key.
    pub fn encrypt(&self, plaintext: Option<&str>) -> Result<Option<String>> {
        let (key, version) = self.active_key()?;
        crypto::encrypt(key.as_bytes(), version, plaintext)
    }

    /// Decrypt with the active key.
    pub fn decrypt(&self, blob: Option<&str>) -> Result<Option<String>> {
        let (key, _) = self.active_key()?;
        crypto::decrypt(key.as_bytes(), blob)
    }

    /// Decrypt `blob` with an explicitly supplied old key, then re-encrypt
    /// under the active key and version. Used only by the rotation job.
    pub fn re_encrypt(&self, blob: &str, old_key: &FieldKey) -> Result<String> {
        let (key, version) = self.active_key()?;
        let parsed = crypto::EncryptedBlob::from_base64(blob)?;
        let plaintext = crypto::decrypt_blob(old_key.as_bytes(), &parsed)?;
        crypto::encrypt(key.as_bytes(), version, Some(&plaintext))?
            .ok_or_else(|| IncidentError::Format("re-encrypted value is empty".into()))
    }
}
