//! Low-level cryptographic operations for single field values.
//!
//! This module and `keys` are the only places in the crate that touch
//! cipher primitives directly. Everything else encrypts and decrypts through
//! the functions exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption)
//! - **IV**: 128-bit (16 bytes), generated fresh per call via `SystemRandom`
//! - **Tag**: 128-bit (16 bytes), stored detached from the ciphertext
//! - **Key size**: 256 bits (32 bytes)
//!
//! ## Blob layout
//! ```text
//! base64( [ key version (1) ][ IV (16) ][ auth tag (16) ][ ciphertext (N) ] )
//! ```

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use base64::{engine::general_purpose::STANDARD, Engine};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{IncidentError, Result};

/// AES-256-GCM instantiated with a 16-byte IV.
type FieldCipher = AesGcm<Aes256, U16>;

/// Size of the initialization vector in bytes.
pub const IV_LEN: usize = 16;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Size of a field encryption key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Smallest decodable blob: version byte, IV and tag with no ciphertext.
pub const MIN_BLOB_LEN: usize = 1 + IV_LEN + TAG_LEN;

/// Character used by [`mask`].
const MASK_CHAR: char = '*';

/// Returned by [`mask`] for values too short to partially reveal.
const MASK_PLACEHOLDER: &str = "***";

/// One encrypted field value in its parsed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub key_version: u8,
    pub iv: [u8; IV_LEN],
    pub auth_tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Encode to the single opaque base64 string stored on the record.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(MIN_BLOB_LEN + self.ciphertext.len());
        bytes.push(self.key_version);
        bytes.extend_from_slice(&self.iv);
        bytes.extend_from_slice(&self.auth_tag);
        bytes.extend_from_slice(&self.ciphertext);
        STANDARD.encode(&bytes)
    }

    /// Parse a stored blob. Fails with `Format` on bad base64 or short input.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| IncidentError::Format(format!("invalid base64: {}", e)))?;

        if bytes.len() < MIN_BLOB_LEN {
            return Err(IncidentError::Format("blob too short".to_string()));
        }

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[1..1 + IV_LEN]);
        let mut auth_tag = [0u8; TAG_LEN];
        auth_tag.copy_from_slice(&bytes[1 + IV_LEN..MIN_BLOB_LEN]);

        Ok(Self {
            key_version: bytes[0],
            iv,
            auth_tag,
            ciphertext: bytes[MIN_BLOB_LEN..].to_vec(),
        })
    }
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    let rng = SystemRandom::new();
    rng.fill(buf).map_err(|_| IncidentError::Randomness)
}

/// Encrypt a single string value.
///
/// Returns `Ok(None)` for absent or empty input: encryption is only
/// meaningful for present values. A fresh IV is drawn for every call.
pub fn encrypt(
    key_bytes: &[u8; KEY_LEN],
    key_version: u8,
    plaintext: Option<&str>,
) -> Result<Option<String>> {
    let plaintext = match plaintext {
        Some(p) if !p.is_empty() => p,
        _ => return Ok(None),
    };

    let cipher = FieldCipher::new(key_bytes.into());

    let mut iv = [0u8; IV_LEN];
    fill_random(&mut iv)?;

    let mut buffer = plaintext.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), &[], &mut buffer)
        .map_err(|_| IncidentError::Encryption)?;

    let mut auth_tag = [0u8; TAG_LEN];
    auth_tag.copy_from_slice(tag.as_slice());

    let blob = EncryptedBlob {
        key_version,
        iv,
        auth_tag,
        ciphertext: buffer,
    };
    Ok(Some(blob.to_base64()))
}

/// Decrypt a stored blob.
///
/// Returns `Ok(None)` for absent input. A failed tag check yields
/// `Integrity`; the caller never receives partial plaintext.
pub fn decrypt(key_bytes: &[u8; KEY_LEN], blob: Option<&str>) -> Result<Option<String>> {
    let blob = match blob {
        Some(b) => EncryptedBlob::from_base64(b)?,
        None => return Ok(None),
    };
    decrypt_blob(key_bytes, &blob).map(Some)
}

/// Decrypt an already-parsed blob.
pub fn decrypt_blob(key_bytes: &[u8; KEY_LEN], blob: &EncryptedBlob) -> Result<String> {
    let cipher = FieldCipher::new(key_bytes.into());

    let mut buffer = blob.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            Nonce::<U16>::from_slice(&blob.iv),
            &[],
            &mut buffer,
            Tag::from_slice(&blob.auth_tag),
        )
        .map_err(|_| IncidentError::Integrity)?;

    String::from_utf8(buffer).map_err(|_| IncidentError::Format("plaintext is not UTF-8".into()))
}

/// Key version embedded in a stored blob, without decrypting it.
pub fn blob_key_version(blob: &str) -> Result<u8> {
    EncryptedBlob::from_base64(blob).map(|b| b.key_version)
}

/// One-way SHA-256 digest, hex encoded.
pub fn hash(value: &str) -> String {
    hex::encode(digest::digest(&digest::SHA256, value.as_bytes()))
}

/// Mask all but the last `visible_suffix` characters.
///
/// Values at or below the suffix length collapse to a fixed placeholder so
/// neither their content nor their length is revealed.
pub fn mask(value: &str, visible_suffix: usize) -> String {
    let len = value.chars().count();
    if len <= visible_suffix {
        return MASK_PLACEHOLDER.to_string();
    }

    let hidden = len - visible_suffix;
    value
        .chars()
        .enumerate()
        .map(|(i, c)| if i < hidden { MASK_CHAR } else { c })
        .collect()
}

/// Random hex token for correlation ids. Never used as key material.
pub fn random_token(byte_len: usize) -> Result<String> {
    let mut buf = vec![0u8; byte_len];
    fill_random(&mut buf)?;
    Ok(hex::encode(buf))
}

/// Uniformly random `u32` from the system RNG.
pub(crate) fn random_u32() -> Result<u32> {
    let mut buf = [0u8; 4];
    fill_random(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Generate a random 256-bit key.
pub fn generate_random_key() -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    fill_random(&mut key)?;
    Ok(key)
}
