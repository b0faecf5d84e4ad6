//! Storage seams.
//!
//! The record store is a generic keyed document store holding only sealed
//! records. The blob store keeps attachment bytes under opaque keys. Both
//! ship with in-process implementations; production deployments put a real
//! database or object store behind the same traits.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::codec::{Document, SealedRecord};
use crate::error::{IncidentError, Result};
use crate::model::{IncidentFilters, IncidentStatus, IncidentType, Severity};
use crate::policy::Visibility;

/// A list query: visibility scope, caller filters and a page window.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub visibility: Visibility,
    pub filters: IncidentFilters,
    pub include_deleted: bool,
    pub offset: usize,
    pub limit: usize,
}

impl RecordQuery {
    /// Every record, deleted ones included. Used by maintenance jobs.
    pub fn all(offset: usize, limit: usize) -> Self {
        Self {
            visibility: Visibility::All,
            filters: IncidentFilters::default(),
            include_deleted: true,
            offset,
            limit,
        }
    }

    /// True for a scan over every record with no caller filters.
    fn is_unfiltered(&self) -> bool {
        self.include_deleted
            && matches!(self.visibility, Visibility::All)
            && self.filters == IncidentFilters::default()
    }

    /// Whether a stored document satisfies this query (ignoring paging).
    pub fn matches(&self, doc: &Document) -> bool {
        let view: QueryView = match serde_json::from_value(Value::Object(doc.clone())) {
            Ok(view) => view,
            Err(err) => {
                // Maintenance scans still see the record so it can be repaired
                // or rotated; filtered views skip it.
                let included = self.is_unfiltered();
                warn!(
                    record_id = doc.get("id").and_then(serde_json::Value::as_str).unwrap_or("<none>"),
                    error = %err,
                    included,
                    "stored record is missing query attributes"
                );
                return included;
            }
        };

        if view.deleted && !self.include_deleted {
            return false;
        }
        if !self.visibility.admits(&view.created_by, &view.staff_involved) {
            return false;
        }

        let f = &self.filters;
        if f.status.is_some_and(|s| s != view.status)
            || f.incident_type.is_some_and(|t| t != view.incident_type)
            || f.severity.is_some_and(|s| s != view.severity)
            || f.date_from.is_some_and(|d| view.incident_date < d)
            || f.date_to.is_some_and(|d| view.incident_date > d)
        {
            return false;
        }
        if let Some(youth_id) = &f.youth_id {
            if view.youth_id.as_deref() != Some(youth_id.as_str()) {
                return false;
            }
        }
        if let Some(term) = f.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let term = term.to_lowercase();
            let hit = [&view.summary, &view.description, &view.location, &view.incident_number]
                .iter()
                .any(|field| field.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Plaintext attributes a query can filter on. Sensitive fields are
/// encrypted at rest and therefore not searchable.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryView {
    incident_number: String,
    status: IncidentStatus,
    incident_type: IncidentType,
    severity: Severity,
    incident_date: NaiveDate,
    location: String,
    summary: String,
    description: String,
    #[serde(default)]
    youth_id: Option<String>,
    created_by: String,
    #[serde(default)]
    staff_involved: Vec<String>,
    #[serde(default)]
    deleted: bool,
}

/// One page of matching records plus the total match count.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub records: Vec<SealedRecord>,
    pub total: usize,
}

/// Keyed store of sealed incident records.
///
/// Per-id writes are assumed atomic at this layer.
pub trait RecordStore: Send + Sync {
    fn insert(&self, record: SealedRecord) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<SealedRecord>>;

    /// Replace the record stored under `id`.
    fn update(&self, id: &str, record: SealedRecord) -> Result<()>;

    /// Matching records ordered newest first, windowed by offset/limit.
    fn query(&self, query: &RecordQuery) -> Result<QueryResult>;

    fn incident_number_exists(&self, number: &str) -> Result<bool>;
}

/// Byte storage for attachments.
pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn delete(&self, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, SealedRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn record_id(record: &SealedRecord) -> Result<String> {
    record
        .id()
        .map(str::to_string)
        .ok_or_else(|| IncidentError::Storage("record has no id".into()))
}

fn created_at(record: &SealedRecord) -> Option<DateTime<Utc>> {
    record
        .as_document()
        .get("createdAt")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

impl RecordStore for InMemoryRecordStore {
    fn insert(&self, record: SealedRecord) -> Result<()> {
        let id = record_id(&record)?;
        let mut records = self.records.write().map_err(IncidentError::storage)?;
        if records.contains_key(&id) {
            return Err(IncidentError::Storage(format!("duplicate id {}", id)));
        }
        records.insert(id, record);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<SealedRecord>> {
        Ok(self
            .records
            .read()
            .map_err(IncidentError::storage)?
            .get(id)
            .cloned())
    }

    fn update(&self, id: &str, record: SealedRecord) -> Result<()> {
        let mut records = self.records.write().map_err(IncidentError::storage)?;
        match records.get_mut(id) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(IncidentError::Storage(format!("no record {}", id))),
        }
    }

    fn query(&self, query: &RecordQuery) -> Result<QueryResult> {
        let records = self.records.read().map_err(IncidentError::storage)?;
        let mut hits: Vec<&SealedRecord> = records
            .values()
            .filter(|r| query.matches(r.as_document()))
            .collect();
        hits.sort_by(|a, b| {
            created_at(b)
                .cmp(&created_at(a))
                .then_with(|| a.id().cmp(&b.id()))
        });

        Ok(QueryResult {
            total: hits.len(),
            records: hits
                .into_iter()
                .skip(query.offset)
                .take(query.limit)
                .cloned()
                .collect(),
        })
    }

    fn incident_number_exists(&self, number: &str) -> Result<bool> {
        Ok(self
            .records
            .read()
            .map_err(IncidentError::storage)?
            .values()
            .any(|r| r.as_document().get("incidentNumber").and_then(Value::as_str) == Some(number)))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.blobs
            .write()
            .map_err(IncidentError::storage)?
            .insert(key.to_string(), bytes);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().map_err(IncidentError::storage)?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.blobs.write().map_err(IncidentError::storage)?.remove(key);
        Ok(())
    }
}
