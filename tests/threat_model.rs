mod common;

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;

use incident_vault::audit::AuditTrail;
use incident_vault::codec::SealedRecord;
use incident_vault::store::{InMemoryBlobStore, InMemoryRecordStore, RecordStore};
use incident_vault::{
    IncidentConfig, IncidentError, IncidentPatch, IncidentStatus, IncidentStore, SensitiveField,
};

use common::*;

fn store_over(records: Arc<InMemoryRecordStore>, key_fill: u8) -> IncidentStore {
    IncidentStore::new(
        key_manager(key_fill, 1),
        records,
        Arc::new(InMemoryBlobStore::new()),
        AuditTrail::in_memory(),
        &IncidentConfig::default(),
    )
    .unwrap()
}

fn flip_last_byte(blob: &str) -> String {
    let mut raw = STANDARD.decode(blob).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0x01;
    STANDARD.encode(raw)
}

#[test]
fn test_database_dump_reveals_no_sensitive_plaintext() {
    // Threat: an attacker obtains a copy of the record store.
    let records = Arc::new(InMemoryRecordStore::new());
    let store = store_over(Arc::clone(&records), 1);
    let created = store.create(new_incident("alice"), &staff("alice")).unwrap();

    let stored = records.get(&created.id).unwrap().unwrap();
    assert!(!stored.has_plaintext_sensitive());

    let dump = serde_json::to_string(&stored).unwrap();
    for secret in [YOUTH_NAME, YOUTH_DOB, MEDICAL] {
        assert!(!dump.contains(secret), "{secret} stored in plaintext");
    }
    for field in SensitiveField::ALL {
        assert!(stored.sealed_value(field).is_some(), "{} not sealed", field.name());
    }

    // The caller still gets the plaintext back.
    assert_eq!(created.youth_name.as_deref(), Some(YOUTH_NAME));
    assert_eq!(created.medical_details.as_deref(), Some(MEDICAL));
}

#[test]
fn test_tampered_ciphertext_is_rejected() {
    // Threat: an attacker with write access to the store edits a sealed value.
    let records = Arc::new(InMemoryRecordStore::new());
    let store = store_over(Arc::clone(&records), 1);
    let created = store.create(new_incident("alice"), &staff("alice")).unwrap();

    let mut doc = records.get(&created.id).unwrap().unwrap().as_document().clone();
    let blob = doc["youthName_encrypted"].as_str().unwrap().to_string();
    doc.insert(
        "youthName_encrypted".into(),
        Value::String(flip_last_byte(&blob)),
    );
    let tampered: SealedRecord = serde_json::from_value(Value::Object(doc)).unwrap();
    records.update(&created.id, tampered).unwrap();

    let err = store.get(&created.id, &supervisor()).unwrap_err();
    assert!(matches!(err, IncidentError::Integrity));
    assert_eq!(err.status_code(), 500);
}

#[test]
fn test_plaintext_record_cannot_be_planted() {
    // Threat: a writer bypassing the codec tries to store a subject name in clear.
    let records = Arc::new(InMemoryRecordStore::new());
    let store = store_over(Arc::clone(&records), 1);
    let created = store.create(new_incident("alice"), &staff("alice")).unwrap();

    let mut doc = records.get(&created.id).unwrap().unwrap().as_document().clone();
    doc.insert("youthName".into(), Value::String(YOUTH_NAME.into()));
    assert!(serde_json::from_value::<SealedRecord>(Value::Object(doc)).is_err());
}

#[test]
fn test_imported_draft_cannot_be_submitted_unsigned() {
    // Threat: a record written outside the store skips create-time validation.
    let records = Arc::new(InMemoryRecordStore::new());
    let store = store_over(Arc::clone(&records), 1);
    let alice = staff("alice");
    let created = store.create(new_incident("alice"), &alice).unwrap();

    let mut doc = records.get(&created.id).unwrap().unwrap().as_document().clone();
    doc.insert("signatures".into(), Value::Array(Vec::new()));
    let imported: SealedRecord = serde_json::from_value(Value::Object(doc)).unwrap();
    records.update(&created.id, imported).unwrap();

    let err = store
        .update(
            &created.id,
            IncidentPatch {
                status: Some(IncidentStatus::Submitted),
                ..Default::default()
            },
            &alice,
        )
        .unwrap_err();
    assert!(matches!(err, IncidentError::Validation(ref v) if v.mentions("status")));

    let stored = store.get(&created.id, &alice).unwrap();
    assert_eq!(stored.status, IncidentStatus::Draft);
}

#[test]
fn test_wrong_key_cannot_open_records() {
    // Threat: records copied to an environment holding a different key.
    let records = Arc::new(InMemoryRecordStore::new());
    let original = store_over(Arc::clone(&records), 1);
    let created = original.create(new_incident("alice"), &staff("alice")).unwrap();

    let foreign = store_over(records, 2);
    assert!(matches!(
        foreign.get(&created.id, &supervisor()),
        Err(IncidentError::Integrity)
    ));
}

#[test]
fn test_anonymized_export_leaks_no_identifiers() {
    // Threat: an exported report is shared outside the agency.
    let store = store();
    let created = store.create(new_incident("alice"), &staff("alice")).unwrap();

    let view = store.export(&created.id, &supervisor(), true).unwrap();
    assert!(view.anonymized);
    assert!(view.incident.redacted_for_export);

    let json = serde_json::to_string(&view).unwrap();
    for secret in [YOUTH_NAME, YOUTH_DOB, MEDICAL, "Y-17", "Casey Doe", "555-0100"] {
        assert!(!json.contains(secret), "{secret} leaked in anonymized export");
    }
    assert!(view.incident.encrypted_fields.is_empty());
    assert_eq!(view.incident.parents_notified_by.as_deref(), Some("[REDACTED]"));

    // Exporting never modifies the stored record.
    let again = store.get(&created.id, &supervisor()).unwrap();
    assert_eq!(again.youth_name.as_deref(), Some(YOUTH_NAME));
}

#[test]
fn test_audit_log_never_holds_sensitive_plaintext() {
    // Threat: audit readers learn sensitive values from change history.
    let store = store();
    let alice = staff("alice");
    let created = store.create(new_incident("alice"), &alice).unwrap();

    let patch = IncidentPatch {
        youth_name: Some("Jordan Smythe".into()),
        summary: Some("Updated summary after review".into()),
        ..Default::default()
    };
    store.update(&created.id, patch, &alice).unwrap();

    let entries = store.audit_log(&created.id, &supervisor()).unwrap();
    let json = serde_json::to_string(&entries).unwrap();
    assert!(!json.contains(YOUTH_NAME));
    assert!(!json.contains("Jordan Smythe"));
    assert!(json.contains("Updated summary after review"));

    let update = &entries[0];
    let diff = update.diff.as_ref().unwrap();
    assert!(diff.iter().any(|c| c.field == "youthName"));
}

#[test]
fn test_uninitialized_keys_refuse_to_start() {
    let result = IncidentStore::in_memory(Arc::new(incident_vault::KeyManager::new()));
    assert!(matches!(result, Err(IncidentError::NotInitialized)));
}
