//! Sensitive-field encryption for stored records.
//!
//! Records travel through the store as JSON documents. Before a document is
//! persisted, each sensitive field holding a non-empty string is moved to
//! `<field>_encrypted` as an encrypted blob and its plaintext key is removed.
//! The field names currently held encrypted are kept in `encryptedFields`.
//!
//! `SealedRecord` is the only type the record store accepts. It can only be
//! produced by [`FieldCodec::encrypt_sensitive`] (or read back from storage),
//! so a document with plaintext sensitive fields never reaches persistence.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{IncidentError, Result};
use crate::keys::KeyManager;
use crate::schema::ValidationErrors;

/// A record as stored: a flat JSON object.
pub type Document = Map<String, Value>;

/// Bookkeeping key listing the fields stored encrypted.
pub const ENCRYPTED_FIELDS_KEY: &str = "encryptedFields";

const ENCRYPTED_SUFFIX: &str = "_encrypted";

/// The record attributes that are never stored in plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SensitiveField {
    YouthName,
    YouthDob,
    MedicalDetails,
}

impl SensitiveField {
    pub const ALL: [SensitiveField; 3] = [Self::YouthName, Self::YouthDob, Self::MedicalDetails];

    /// Plaintext document key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::YouthName => "youthName",
            Self::YouthDob => "youthDob",
            Self::MedicalDetails => "medicalDetails",
        }
    }

    /// Document key of the encrypted form.
    pub fn encrypted_name(&self) -> &'static str {
        match self {
            Self::YouthName => "youthName_encrypted",
            Self::YouthDob => "youthDob_encrypted",
            Self::MedicalDetails => "medicalDetails_encrypted",
        }
    }

    /// Map an `<field>_encrypted` key back to its field.
    pub fn from_encrypted_name(key: &str) -> Option<Self> {
        let base = key.strip_suffix(ENCRYPTED_SUFFIX)?;
        Self::ALL.into_iter().find(|f| f.name() == base)
    }
}

/// Serialize any record-shaped value into a document.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(IncidentError::Format("record is not a JSON object".into())),
    }
}

// ---------------------------------------------------------------------------
// Sealed record
// ---------------------------------------------------------------------------

/// A document whose sensitive fields are encrypted.
///
/// Deserializing rejects documents that carry a sensitive field in
/// plaintext.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SealedRecord(Document);

impl<'de> Deserialize<'de> for SealedRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let record = SealedRecord(Document::deserialize(deserializer)?);
        match SensitiveField::ALL
            .iter()
            .find(|f| record.0.contains_key(f.name()))
        {
            Some(field) => Err(de::Error::custom(format!(
                "{} is stored in plaintext",
                field.name()
            ))),
            None => Ok(record),
        }
    }
}

impl SealedRecord {
    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub(crate) fn into_document(self) -> Document {
        self.0
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// The stored blob for `field`, if the field is set.
    pub fn sealed_value(&self, field: SensitiveField) -> Option<&str> {
        self.0.get(field.encrypted_name()).and_then(Value::as_str)
    }

    /// Whether any sensitive field appears in plaintext. Always false for a
    /// record produced by the codec.
    pub fn has_plaintext_sensitive(&self) -> bool {
        SensitiveField::ALL
            .iter()
            .any(|f| self.0.contains_key(f.name()))
    }
}

fn encrypted_fields_of(doc: &Document) -> BTreeSet<String> {
    doc.get(ENCRYPTED_FIELDS_KEY)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Moves sensitive fields to and from their encrypted-at-rest form.
#[derive(Debug, Clone)]
pub struct FieldCodec {
    keys: Arc<KeyManager>,
}

impl FieldCodec {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    /// Encrypt every sensitive field present as a non-empty string.
    ///
    /// Fields already in encrypted form and not resubmitted as plaintext are
    /// left as they are, so sealing a sealed document is a no-op.
    pub fn encrypt_sensitive(&self, mut doc: Document) -> Result<SealedRecord> {
        let mut encrypted = encrypted_fields_of(&doc);

        for field in SensitiveField::ALL {
            match doc.remove(field.name()) {
                Some(Value::String(plaintext)) if !plaintext.is_empty() => {
                    let blob = self
                        .keys
                        .encrypt(Some(&plaintext))?
                        .ok_or(IncidentError::Encryption)?;
                    doc.insert(field.encrypted_name().to_string(), Value::String(blob));
                }
                Some(Value::String(_)) | Some(Value::Null) | None => {}
                Some(_) => {
                    return Err(IncidentError::Validation(ValidationErrors::single(
                        field.name(),
                        "must be a string",
                    )));
                }
            }

            if doc.get(field.encrypted_name()).map_or(false, Value::is_string) {
                encrypted.insert(field.name().to_string());
            } else {
                encrypted.remove(field.name());
            }
        }

        doc.insert(
            ENCRYPTED_FIELDS_KEY.to_string(),
            Value::Array(encrypted.into_iter().map(Value::String).collect()),
        );
        Ok(SealedRecord(doc))
    }

    /// Decrypt every `<field>_encrypted` entry back to its plaintext key.
    ///
    /// A blob that fails authentication is an error, never an absent field.
    pub fn decrypt_sensitive(&self, record: &SealedRecord) -> Result<Document> {
        let mut doc = record.0.clone();

        for field in SensitiveField::ALL {
            match doc.remove(field.encrypted_name()) {
                Some(Value::String(blob)) => {
                    if let Some(plaintext) = self.keys.decrypt(Some(&blob))? {
                        doc.insert(field.name().to_string(), Value::String(plaintext));
                    }
                }
                Some(Value::Null) | None => {}
                Some(_) => {
                    return Err(IncidentError::Format(format!(
                        "{} is not a string",
                        field.encrypted_name()
                    )));
                }
            }
        }

        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{FieldKey, DEFAULT_KDF_SALT};
    use serde_json::json;

    fn codec() -> FieldCodec {
        let key = FieldKey::from_bytes([3u8; 32]);
        FieldCodec::new(Arc::new(KeyManager::with_key(key, 1)))
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_plaintext_is_removed_and_listed() {
        let sealed = codec()
            .encrypt_sensitive(doc(json!({
                "id": "a",
                "youthName": "Jordan",
                "medicalDetails": "Bruised wrist",
                "summary": "kept as is"
            })))
            .unwrap();

        assert!(!sealed.has_plaintext_sensitive());
        assert!(sealed.sealed_value(SensitiveField::YouthName).is_some());
        assert!(sealed.sealed_value(SensitiveField::YouthDob).is_none());
        assert_eq!(sealed.as_document()["summary"], "kept as is");
        assert_eq!(
            sealed.as_document()[ENCRYPTED_FIELDS_KEY],
            json!(["medicalDetails", "youthName"])
        );
    }

    #[test]
    fn test_roundtrip_restores_sensitive_subset() {
        let codec = codec();
        let original = doc(json!({
            "youthName": "Jordan",
            "youthDob": "2010-04-02",
            "medicalDetails": null
        }));
        let sealed = codec.encrypt_sensitive(original).unwrap();
        let opened = codec.decrypt_sensitive(&sealed).unwrap();

        assert_eq!(opened["youthName"], "Jordan");
        assert_eq!(opened["youthDob"], "2010-04-02");
        assert!(!opened.contains_key("medicalDetails"));
        assert!(!opened.contains_key("youthName_encrypted"));
    }

    #[test]
    fn test_empty_values_are_dropped_not_encrypted() {
        let sealed = codec()
            .encrypt_sensitive(doc(json!({ "youthName": "" })))
            .unwrap();
        assert!(!sealed.as_document().contains_key("youthName"));
        assert!(sealed.sealed_value(SensitiveField::YouthName).is_none());
        assert_eq!(sealed.as_document()[ENCRYPTED_FIELDS_KEY], json!([]));
    }

    #[test]
    fn test_resealing_does_not_double_wrap() {
        let codec = codec();
        let once = codec
            .encrypt_sensitive(doc(json!({ "youthName": "Jordan" })))
            .unwrap();
        let twice = codec.encrypt_sensitive(once.as_document().clone()).unwrap();

        assert_eq!(
            once.sealed_value(SensitiveField::YouthName),
            twice.sealed_value(SensitiveField::YouthName)
        );
        assert_eq!(codec.decrypt_sensitive(&twice).unwrap()["youthName"], "Jordan");
    }

    #[test]
    fn test_non_string_sensitive_value_is_rejected() {
        let err = codec()
            .encrypt_sensitive(doc(json!({ "youthDob": 20100402 })))
            .unwrap_err();
        assert!(matches!(err, IncidentError::Validation(e) if e.mentions("youthDob")));
    }

    #[test]
    fn test_foreign_key_is_integrity_error() {
        let sealed = codec()
            .encrypt_sensitive(doc(json!({ "youthName": "Jordan" })))
            .unwrap();
        let other = FieldCodec::new(Arc::new(
            KeyManager::from_secret("another passphrase", 1, DEFAULT_KDF_SALT).unwrap(),
        ));
        assert!(matches!(
            other.decrypt_sensitive(&sealed),
            Err(IncidentError::Integrity)
        ));
    }

    #[test]
    fn test_plaintext_document_does_not_deserialize_as_sealed() {
        let err = serde_json::from_value::<SealedRecord>(json!({
            "id": "a",
            "youthName": "Jordan"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("youthName"));

        let sealed = codec()
            .encrypt_sensitive(doc(json!({ "id": "a", "youthName": "Jordan" })))
            .unwrap();
        let stored = serde_json::to_value(&sealed).unwrap();
        let restored: SealedRecord = serde_json::from_value(stored).unwrap();
        assert_eq!(restored, sealed);
    }

    #[test]
    fn test_encrypted_name_mapping() {
        assert_eq!(
            SensitiveField::from_encrypted_name("medicalDetails_encrypted"),
            Some(SensitiveField::MedicalDetails)
        );
        assert_eq!(SensitiveField::from_encrypted_name("summary_encrypted"), None);
        assert_eq!(SensitiveField::from_encrypted_name("youthName"), None);
    }
}
