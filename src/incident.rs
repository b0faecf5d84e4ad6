//! Incident orchestration.
//!
//! `IncidentStore` is the only entry point for reading or writing incident
//! records. Every operation follows the same path:
//!
//! ```text
//! write: policy gate -> validate -> seal -> persist -> audit
//! read:  fetch -> policy gate -> audit -> open (-> anonymize) -> return
//! ```
//!
//! Plaintext sensitive values exist only inside a single call.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::anonymize::{self, REDACTED};
use crate::audit::{self, AuditAction, AuditLogEntry, AuditTrail, ExportMode, FieldChange, FileAuditSink};
use crate::codec::{to_document, Document, FieldCodec, SealedRecord, SensitiveField, ENCRYPTED_FIELDS_KEY};
use crate::config::{AttachmentLimits, IncidentConfig};
use crate::crypto;
use crate::error::{IncidentError, Result};
use crate::keys::{FieldKey, KeyManager};
use crate::model::{
    Attachment, AttachmentUpload, ExportView, Incident, IncidentFilters, IncidentPage,
    IncidentPatch, IncidentStatus, NewIncident, Principal,
};
use crate::policy::{self, Operation, RecordFacts};
use crate::schema::{self, ValidationErrors};
use crate::store::{BlobStore, InMemoryBlobStore, InMemoryRecordStore, RecordQuery, RecordStore};

/// Attempts at drawing an unused incident number before giving up.
const INCIDENT_NUMBER_ATTEMPTS: usize = 5;

/// Records fetched per page by the rotation job.
const ROTATION_BATCH: usize = 100;

/// Outcome of a key rotation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub records: usize,
    pub fields: usize,
}

fn operation_span(op: &'static str, principal: &Principal) -> tracing::Span {
    let correlation_id = crypto::random_token(8).unwrap_or_default();
    info_span!(
        "incident",
        op,
        correlation_id = %correlation_id,
        principal = %principal.id,
        role = ?principal.role
    )
}

fn stamp(doc: &mut Document, principal: &Principal, now: DateTime<Utc>) -> Result<()> {
    doc.insert("updatedAt".to_string(), serde_json::to_value(now)?);
    doc.insert("lastModifiedBy".to_string(), Value::String(principal.id.clone()));
    Ok(())
}

fn stored_attachments(doc: &Document) -> Result<Vec<Attachment>> {
    match doc.get("attachments") {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(Vec::new()),
    }
}

fn redact_for_listing(mut incident: Incident) -> Incident {
    if incident.medical_details.is_some() {
        incident.medical_details = Some(REDACTED.to_string());
    }
    incident
}

/// Orchestrates validation, encryption, access control and auditing for
/// incident records.
pub struct IncidentStore {
    keys: Arc<KeyManager>,
    codec: FieldCodec,
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    audit: AuditTrail,
    limits: AttachmentLimits,
    default_page_size: usize,
    max_page_size: usize,
}

impl IncidentStore {
    /// Wire the store to its collaborators.
    ///
    /// Fails with `NotInitialized` if the key manager has no active key:
    /// the store refuses to start rather than fail on the first request.
    pub fn new(
        keys: Arc<KeyManager>,
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        audit: AuditTrail,
        config: &IncidentConfig,
    ) -> Result<Self> {
        if !keys.is_initialized() {
            return Err(IncidentError::NotInitialized);
        }
        Ok(Self {
            codec: FieldCodec::new(Arc::clone(&keys)),
            keys,
            records,
            blobs,
            audit,
            limits: config.attachments.clone(),
            default_page_size: config.default_page_size.max(1),
            max_page_size: config.max_page_size.max(1),
        })
    }

    /// A store backed by in-process record, blob and audit stores.
    pub fn in_memory(keys: Arc<KeyManager>) -> Result<Self> {
        Self::new(
            keys,
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryBlobStore::new()),
            AuditTrail::in_memory(),
            &IncidentConfig::default(),
        )
    }

    /// Build an in-process store from configuration, deriving the key and
    /// attaching the JSON-lines audit mirror when configured.
    pub fn from_config(config: &IncidentConfig) -> Result<Self> {
        let keys = KeyManager::from_secret(&config.encryption_key, config.key_version, &config.kdf_salt)?;
        let audit = AuditTrail::in_memory();
        if let Some(path) = &config.audit_log_path {
            let sink = FileAuditSink::new(path)
                .map_err(|e| IncidentError::Config(format!("audit log {}: {}", path.display(), e)))?;
            audit.add_forward_sink(Box::new(sink));
        }
        Self::new(
            Arc::new(keys),
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryBlobStore::new()),
            audit,
            config,
        )
    }

    pub fn audit_trail(&self) -> &AuditTrail {
        &self.audit
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Validate, seal and persist a new incident authored by `principal`.
    pub fn create(&self, payload: NewIncident, principal: &Principal) -> Result<Incident> {
        let span = operation_span("create", principal);
        let _guard = span.enter();

        policy::authorize(principal, Operation::Create { status: payload.status }, None)
            .into_result("new")?;
        schema::validate_new(&payload).map_err(IncidentError::Validation)?;

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let number = self.next_incident_number(now)?;
        let incident = payload.into_incident(id.clone(), number, principal, now);

        let sealed = self.codec.encrypt_sensitive(to_document(&incident)?)?;
        self.records.insert(sealed.clone())?;
        self.audit.append(&id, AuditAction::Created, principal, None, None);

        info!(incident_id = %id, "incident created");
        self.open(&sealed)
    }

    /// One page of the incidents visible to `principal`, newest first.
    /// Medical details are redacted in listings.
    pub fn list(
        &self,
        filters: IncidentFilters,
        principal: &Principal,
        page: Option<usize>,
        page_size: Option<usize>,
    ) -> Result<IncidentPage> {
        let span = operation_span("list", principal);
        let _guard = span.enter();

        policy::authorize(principal, Operation::List, None).into_result("list")?;

        let page = page.unwrap_or(1).max(1);
        let page_size = page_size
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);
        let offset = (page - 1).saturating_mul(page_size);

        let query = RecordQuery {
            visibility: policy::visibility(principal),
            filters,
            include_deleted: false,
            offset,
            limit: page_size,
        };
        let result = self.records.query(&query)?;
        let incidents = result
            .records
            .iter()
            .map(|r| self.open(r).map(redact_for_listing))
            .collect::<Result<Vec<_>>>()?;

        debug!(total = result.total, returned = incidents.len(), "incidents listed");
        Ok(IncidentPage {
            has_more: offset + incidents.len() < result.total,
            incidents,
            total: result.total,
            page,
            page_size,
        })
    }

    /// Fetch and decrypt one incident.
    pub fn get(&self, id: &str, principal: &Principal) -> Result<Incident> {
        let span = operation_span("get", principal);
        let _guard = span.enter();

        let (record, _) = self.gate(principal, Operation::Get, id)?;
        self.audit.append(id, AuditAction::Viewed, principal, None, None);
        self.open(&record)
    }

    /// Apply a partial update.
    ///
    /// Only field-level rules run on the payload; cross-field refinements
    /// are a create-time check. Moving a draft to `submitted` requires at
    /// least one immediate action and one signature on the merged record.
    /// Payloads cannot empty those lists, so the check guards records that
    /// reached the record store without passing `create`.
    pub fn update(&self, id: &str, patch: IncidentPatch, principal: &Principal) -> Result<Incident> {
        let span = operation_span("update", principal);
        let _guard = span.enter();

        let (stored, facts) = self.gate(principal, Operation::Update { status: patch.status }, id)?;
        schema::validate_patch(&patch).map_err(IncidentError::Validation)?;

        let sealed_patch = self.codec.encrypt_sensitive(to_document(&patch)?)?;
        let changes = audit::diff(stored.as_document(), sealed_patch.as_document());

        let mut merged = stored.into_document();
        for (key, value) in sealed_patch.into_document() {
            if key != ENCRYPTED_FIELDS_KEY {
                merged.insert(key, value);
            }
        }
        stamp(&mut merged, principal, Utc::now())?;

        // Re-sealing unions the stored and newly encrypted field lists.
        let merged = self.codec.encrypt_sensitive(merged)?;
        let incident = self.open(&merged)?;

        if facts.status == IncidentStatus::Draft
            && incident.status == IncidentStatus::Submitted
            && (incident.immediate_actions.is_empty() || incident.signatures.is_empty())
        {
            return Err(IncidentError::Validation(ValidationErrors::single(
                "status",
                "submission requires at least one immediate action and one signature",
            )));
        }

        self.records.update(id, merged)?;
        let changed = changes.len();
        self.audit.append(id, AuditAction::Updated, principal, Some(changes), None);

        info!(incident_id = id, changed, "incident updated");
        Ok(incident)
    }

    /// Validate and store a batch of attachment files.
    ///
    /// The whole batch is checked before any bytes are written. If a write
    /// fails midway, blobs already written for the batch are removed.
    pub fn add_attachments(
        &self,
        id: &str,
        files: Vec<AttachmentUpload>,
        principal: &Principal,
    ) -> Result<Vec<Attachment>> {
        let span = operation_span("add_attachments", principal);
        let _guard = span.enter();

        let (stored, _) = self.gate(principal, Operation::AddAttachments, id)?;
        let mut doc = stored.into_document();
        let mut attachments = stored_attachments(&doc)?;
        self.check_uploads(&files, &attachments)?;

        let now = Utc::now();
        let mut added: Vec<Attachment> = Vec::with_capacity(files.len());
        for file in files {
            let attachment_id = Uuid::new_v4().to_string();
            let storage_key = format!("incidents/{}/attachments/{}", id, attachment_id);
            let size = file.data.len() as u64;

            if let Err(err) = self.blobs.put(&storage_key, file.data) {
                self.discard_blobs(&added);
                return Err(err);
            }
            added.push(Attachment {
                id: attachment_id,
                filename: file.filename,
                media_type: file.media_type,
                size,
                uploaded_by: principal.id.clone(),
                uploaded_at: now,
                storage_key,
            });
        }

        attachments.extend(added.iter().cloned());
        let persisted = serde_json::to_value(&attachments)
            .map_err(IncidentError::from)
            .and_then(|value| {
                doc.insert("attachments".to_string(), value);
                stamp(&mut doc, principal, now)?;
                let sealed = self.codec.encrypt_sensitive(doc)?;
                self.records.update(id, sealed)
            });
        if let Err(err) = persisted {
            self.discard_blobs(&added);
            return Err(err);
        }

        let ids = added.iter().map(|a| Value::String(a.id.clone())).collect();
        self.audit.append(
            id,
            AuditAction::AttachmentsAdded,
            principal,
            Some(vec![FieldChange {
                field: "attachments".to_string(),
                old: None,
                new: Some(Value::Array(ids)),
            }]),
            None,
        );

        info!(incident_id = id, count = added.len(), "attachments added");
        Ok(added)
    }

    /// Metadata and bytes of one attachment, under the `get` visibility rule.
    pub fn download_attachment(
        &self,
        id: &str,
        attachment_id: &str,
        principal: &Principal,
    ) -> Result<(Attachment, Vec<u8>)> {
        let span = operation_span("download_attachment", principal);
        let _guard = span.enter();

        let (stored, _) = self.gate(principal, Operation::Get, id)?;
        let not_found = || IncidentError::NotFound(format!("attachment {}", attachment_id));
        let attachment = stored_attachments(stored.as_document())?
            .into_iter()
            .find(|a| a.id == attachment_id)
            .ok_or_else(not_found)?;
        let bytes = self.blobs.get(&attachment.storage_key)?.ok_or_else(not_found)?;

        self.audit.append(id, AuditAction::AttachmentDownloaded, principal, None, None);
        Ok((attachment, bytes))
    }

    /// Decrypted export view, optionally anonymized.
    pub fn export(&self, id: &str, principal: &Principal, anonymize: bool) -> Result<ExportView> {
        let span = operation_span("export", principal);
        let _guard = span.enter();

        let (stored, _) = self.gate(principal, Operation::Export, id)?;
        let incident = self.open(&stored)?;
        let (incident, mode) = if anonymize {
            (anonymize::anonymize(&incident), ExportMode::Anonymized)
        } else {
            (incident, ExportMode::Full)
        };

        self.audit.append(id, AuditAction::Exported, principal, None, Some(mode));
        info!(incident_id = id, mode = ?mode, "incident exported");
        Ok(ExportView {
            incident,
            anonymized: anonymize,
        })
    }

    /// Audit entries for a record, newest first. Supervisor/admin only.
    pub fn audit_log(&self, id: &str, principal: &Principal) -> Result<Vec<AuditLogEntry>> {
        let span = operation_span("audit_log", principal);
        let _guard = span.enter();

        self.gate(principal, Operation::ViewAudit, id)?;
        self.audit.list_for(id)
    }

    /// Soft-delete a record. Supervisor/admin only.
    pub fn delete(&self, id: &str, principal: &Principal) -> Result<()> {
        let span = operation_span("delete", principal);
        let _guard = span.enter();

        let (stored, _) = self.gate(principal, Operation::Delete, id)?;
        let mut doc = stored.into_document();
        doc.insert("deleted".to_string(), Value::Bool(true));
        stamp(&mut doc, principal, Utc::now())?;
        self.records.update(id, self.codec.encrypt_sensitive(doc)?)?;

        self.audit.append(
            id,
            AuditAction::Deleted,
            principal,
            Some(vec![FieldChange {
                field: "deleted".to_string(),
                old: Some(Value::Bool(false)),
                new: Some(Value::Bool(true)),
            }]),
            None,
        );
        info!(incident_id = id, "incident deleted");
        Ok(())
    }

    /// Re-encrypt every sealed field not yet under the active key version.
    ///
    /// Operator-triggered batch job. It must run with exclusive access to
    /// the records: concurrent updates during rotation are not supported.
    pub fn rotate_key(&self, old_key: &FieldKey, principal: &Principal) -> Result<RotationReport> {
        let span = operation_span("rotate_key", principal);
        let _guard = span.enter();

        policy::authorize(principal, Operation::RotateKeys, None).into_result("*")?;
        let active_version = self.keys.key_version()?;
        let mut report = RotationReport::default();
        let mut offset = 0;

        loop {
            let page = self.records.query(&RecordQuery::all(offset, ROTATION_BATCH))?;
            let fetched = page.records.len();

            for record in page.records {
                let id = record
                    .id()
                    .map(str::to_string)
                    .ok_or_else(|| IncidentError::Storage("record has no id".into()))?;
                let mut doc = record.into_document();
                let mut changes = Vec::new();

                for field in SensitiveField::ALL {
                    let blob = match doc.get(field.encrypted_name()).and_then(Value::as_str) {
                        Some(blob) => blob.to_string(),
                        None => continue,
                    };
                    if crypto::blob_key_version(&blob)? == active_version {
                        continue;
                    }
                    let rotated = self.keys.re_encrypt(&blob, old_key)?;
                    doc.insert(field.encrypted_name().to_string(), Value::String(rotated.clone()));
                    changes.push(FieldChange {
                        field: field.name().to_string(),
                        old: Some(Value::String(blob)),
                        new: Some(Value::String(rotated)),
                    });
                }

                if changes.is_empty() {
                    continue;
                }
                report.records += 1;
                report.fields += changes.len();
                self.records.update(&id, self.codec.encrypt_sensitive(doc)?)?;
                self.audit.append(&id, AuditAction::KeyRotated, principal, Some(changes), None);
            }

            offset += fetched;
            if fetched < ROTATION_BATCH {
                break;
            }
        }

        info!(
            records = report.records,
            fields = report.fields,
            key_version = active_version,
            "key rotation complete"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Fetch a record and run the policy check against it.
    fn gate(
        &self,
        principal: &Principal,
        op: Operation,
        id: &str,
    ) -> Result<(SealedRecord, RecordFacts)> {
        let record = self.records.get(id)?;
        let facts = record
            .as_ref()
            .map(|r| RecordFacts::from_document(r.as_document()))
            .transpose()?;

        if let Err(err) = policy::authorize(principal, op, facts.as_ref()).into_result(id) {
            warn!(incident_id = id, op = ?op, error = %err, "access denied");
            return Err(err);
        }

        match (record, facts) {
            (Some(record), Some(facts)) => Ok((record, facts)),
            _ => Err(IncidentError::NotFound(format!("incident {}", id))),
        }
    }

    fn open(&self, record: &SealedRecord) -> Result<Incident> {
        let doc = self.codec.decrypt_sensitive(record)?;
        Ok(serde_json::from_value(Value::Object(doc))?)
    }

    /// `INC-<year>-<5 digits>`, re-drawn on collision with a stored number.
    fn next_incident_number(&self, now: DateTime<Utc>) -> Result<String> {
        for _ in 0..INCIDENT_NUMBER_ATTEMPTS {
            let candidate = format!("INC-{}-{:05}", now.year(), crypto::random_u32()? % 100_000);
            if !self.records.incident_number_exists(&candidate)? {
                return Ok(candidate);
            }
            warn!(incident_number = %candidate, "incident number collision, redrawing");
        }
        Err(IncidentError::Storage(
            "could not allocate a unique incident number".into(),
        ))
    }

    fn check_uploads(&self, files: &[AttachmentUpload], existing: &[Attachment]) -> Result<()> {
        let limits = &self.limits;
        let mut errors = ValidationErrors::default();

        if files.is_empty() {
            errors.push("files", "at least one file is required");
        }
        if files.len() > limits.max_files_per_upload {
            errors.push(
                "files",
                format!("at most {} files per upload", limits.max_files_per_upload),
            );
        }

        let mut batch_bytes: u64 = 0;
        for (i, file) in files.iter().enumerate() {
            let size = file.data.len() as u64;
            batch_bytes += size;
            if file.filename.trim().is_empty() {
                errors.push(format!("files[{}].filename", i), "must not be empty");
            }
            if !limits.allows(&file.media_type) {
                errors.push(
                    format!("files[{}].mediaType", i),
                    format!("unsupported media type {}", file.media_type),
                );
            }
            if size > limits.max_file_bytes {
                errors.push(
                    format!("files[{}].data", i),
                    format!("exceeds {} bytes", limits.max_file_bytes),
                );
            }
        }

        let existing_bytes: u64 = existing.iter().map(|a| a.size).sum();
        if existing_bytes + batch_bytes > limits.max_total_bytes {
            errors.push(
                "files",
                format!("total attachments would exceed {} bytes", limits.max_total_bytes),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(IncidentError::Validation(errors))
        }
    }

    fn discard_blobs(&self, written: &[Attachment]) {
        for attachment in written {
            if let Err(err) = self.blobs.delete(&attachment.storage_key) {
                warn!(storage_key = %attachment.storage_key, error = %err, "orphaned attachment blob");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::store::QueryResult;

    /// Reports every incident number as taken.
    struct CrowdedRecordStore;

    impl RecordStore for CrowdedRecordStore {
        fn insert(&self, _record: SealedRecord) -> Result<()> {
            Ok(())
        }

        fn get(&self, _id: &str) -> Result<Option<SealedRecord>> {
            Ok(None)
        }

        fn update(&self, _id: &str, _record: SealedRecord) -> Result<()> {
            Ok(())
        }

        fn query(&self, _query: &RecordQuery) -> Result<QueryResult> {
            Ok(QueryResult::default())
        }

        fn incident_number_exists(&self, _number: &str) -> Result<bool> {
            Ok(true)
        }
    }

    fn keys() -> Arc<KeyManager> {
        Arc::new(KeyManager::with_key(FieldKey::from_bytes([9u8; 32]), 1))
    }

    #[test]
    fn test_incident_number_shape() {
        let store = IncidentStore::in_memory(keys()).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();

        let number = store.next_incident_number(now).unwrap();
        let digits = number.strip_prefix("INC-2025-").unwrap();
        assert_eq!(digits.len(), 5);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_incident_number_gives_up_after_collisions() {
        let store = IncidentStore::new(
            keys(),
            Arc::new(CrowdedRecordStore),
            Arc::new(InMemoryBlobStore::new()),
            AuditTrail::in_memory(),
            &IncidentConfig::default(),
        )
        .unwrap();

        let err = store.next_incident_number(Utc::now()).unwrap_err();
        assert!(matches!(err, IncidentError::Storage(_)));
    }

    #[test]
    fn test_uninitialized_keys_refuse_to_start() {
        let result = IncidentStore::in_memory(Arc::new(KeyManager::new()));
        assert!(matches!(result, Err(IncidentError::NotInitialized)));
    }
}
