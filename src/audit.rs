//! Immutable audit logging.
//!
//! Records every action taken against an incident. The primary store is
//! append-only and queryable per record; additional sinks can receive a
//! copy of every entry (a JSON-lines file, a SIEM forwarder, ...).
//!
//! Appends never fail the operation that triggered them. A failed write is
//! logged at error level and the business operation proceeds.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::codec::{Document, SensitiveField, ENCRYPTED_FIELDS_KEY};
use crate::error::{IncidentError, Result};
use crate::model::Principal;

/// What was done to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Viewed,
    Updated,
    Exported,
    AttachmentsAdded,
    AttachmentDownloaded,
    Deleted,
    KeyRotated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    Full,
    Anonymized,
}

/// One changed field. Sensitive fields carry their encrypted values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// A permanent record of one action against an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub record_id: String,
    pub action: AuditAction,
    pub actor_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<Vec<FieldChange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_mode: Option<ExportMode>,
}

/// Field-level diff of a sealed update payload against the stored record.
///
/// Both sides are in their at-rest form, so sensitive values appear only as
/// ciphertext and the log never holds their plaintext.
pub fn diff(stored: &Document, sealed_patch: &Document) -> Vec<FieldChange> {
    sealed_patch
        .iter()
        .filter(|(key, _)| key.as_str() != ENCRYPTED_FIELDS_KEY)
        .filter(|(key, new)| stored.get(key.as_str()) != Some(*new))
        .map(|(key, new)| FieldChange {
            field: SensitiveField::from_encrypted_name(key)
                .map(|f| f.name().to_string())
                .unwrap_or_else(|| key.clone()),
            old: stored.get(key.as_str()).cloned(),
            new: Some(new.clone()),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Storage seams
// ---------------------------------------------------------------------------

/// The primary, queryable audit store.
pub trait AuditStore: Send + Sync {
    fn append(&self, entry: &AuditLogEntry) -> Result<()>;

    /// Every entry for `record_id`, in append order.
    fn entries_for(&self, record_id: &str) -> Result<Vec<AuditLogEntry>>;
}

/// A sink that receives a copy of every entry. Implement this to forward
/// entries to a file, database, or other persistent store.
pub trait AuditSink: Send {
    fn append(&mut self, entry: AuditLogEntry);
}

/// Append-only in-process audit store.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        self.entries
            .write()
            .map_err(IncidentError::storage)?
            .push(entry.clone());
        Ok(())
    }

    fn entries_for(&self, record_id: &str) -> Result<Vec<AuditLogEntry>> {
        Ok(self
            .entries
            .read()
            .map_err(IncidentError::storage)?
            .iter()
            .filter(|e| e.record_id == record_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Trail
// ---------------------------------------------------------------------------

/// Append-only audit trail with optional forward sinks.
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
    forward_sinks: Mutex<Vec<Box<dyn AuditSink>>>,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field(
                "forward_sinks",
                &self.forward_sinks.lock().map(|s| s.len()).ok(),
            )
            .finish()
    }
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            forward_sinks: Mutex::new(Vec::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryAuditStore::new()))
    }

    /// Add a sink to receive a copy of every entry.
    pub fn add_forward_sink(&self, sink: Box<dyn AuditSink>) {
        match self.forward_sinks.lock() {
            Ok(mut sinks) => sinks.push(sink),
            Err(_) => tracing::error!("audit forward sink list poisoned; sink not added"),
        }
    }

    /// Record an action. Failures are logged and swallowed.
    pub fn append(
        &self,
        record_id: &str,
        action: AuditAction,
        actor: &Principal,
        diff: Option<Vec<FieldChange>>,
        export_mode: Option<ExportMode>,
    ) {
        let entry = AuditLogEntry {
            id: Uuid::new_v4().to_string(),
            record_id: record_id.to_string(),
            action,
            actor_id: actor.id.clone(),
            timestamp: Utc::now(),
            diff,
            export_mode,
        };

        if let Err(err) = self.store.append(&entry) {
            tracing::error!(
                incident_id = record_id,
                action = ?action,
                error = %err,
                "audit write failed"
            );
        }

        if let Ok(mut sinks) = self.forward_sinks.lock() {
            for sink in sinks.iter_mut() {
                sink.append(entry.clone());
            }
        }
    }

    /// All entries for a record, newest first.
    pub fn list_for(&self, record_id: &str) -> Result<Vec<AuditLogEntry>> {
        let mut entries = self.store.entries_for(record_id)?;
        // Reverse first so equal timestamps keep newest-first append order.
        entries.reverse();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes audit entries as JSON lines (one per entry) to a file.
/// Creates the file if it doesn't exist; appends if it does.
pub struct FileAuditSink {
    file: std::fs::File,
}

impl FileAuditSink {
    /// Open or create a file for append-only audit logging.
    pub fn new(path: impl AsRef<Path>) -> std::result::Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&mut self, entry: AuditLogEntry) {
        let written = serde_json::to_string(&entry)
            .map_err(|e| e.to_string())
            .and_then(|line| {
                writeln!(self.file, "{line}")
                    .and_then(|_| self.file.flush())
                    .map_err(|e| e.to_string())
            });
        if let Err(err) = written {
            tracing::error!(entry_id = %entry.id, error = %err, "audit file sink write failed");
        }
    }
}
