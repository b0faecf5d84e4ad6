//! Incident record types.
//!
//! One set of types serves validation, persistence and the API. `Incident`
//! is the decrypted view handed to callers; `NewIncident` and
//! `IncidentPatch` are the create and partial-update payloads.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Principals
// ---------------------------------------------------------------------------

/// Roles known to the access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    Supervisor,
    Admin,
}

impl Role {
    /// Supervisor and admin rank above staff. No further hierarchy.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Supervisor | Self::Admin)
    }
}

/// An already-authenticated actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Draft,
    Submitted,
    UnderReview,
    Resolved,
    Archived,
}

impl IncidentStatus {
    /// Statuses a staff member may set on their own draft.
    pub fn staff_settable(&self) -> bool {
        matches!(self, Self::Draft | Self::Submitted)
    }
}

impl Default for IncidentStatus {
    fn default() -> Self {
        Self::Draft
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    Behavioral,
    Medical,
    Restraint,
    Elopement,
    SelfHarm,
    Aggression,
    PropertyDamage,
    Contraband,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

// ---------------------------------------------------------------------------
// Sub-entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Witness {
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmediateAction {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub staff_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub media_type: String,
    pub size: u64,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub signer_id: String,
    pub signer_name: String,
    /// Signature image or data URL.
    pub data: String,
    pub signed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// An attachment file as received from the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentUpload {
    pub filename: String,
    pub media_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Incident
// ---------------------------------------------------------------------------

/// The decrypted view of an incident record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub incident_number: String,
    pub status: IncidentStatus,
    pub incident_type: IncidentType,
    pub severity: Severity,

    pub incident_date: NaiveDate,
    pub incident_time: String,
    pub reported_date: NaiveDate,
    pub location: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youth_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youth_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youth_dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youth_age: Option<u8>,

    pub summary: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antecedent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequence: Option<String>,

    #[serde(default)]
    pub staff_involved: Vec<String>,
    #[serde(default)]
    pub witnesses: Vec<Witness>,
    #[serde(default)]
    pub immediate_actions: Vec<ImmediateAction>,

    pub medical_attention_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_details: Option<String>,
    pub parents_notified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents_notified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents_notified_by: Option<String>,
    pub authorities_notified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorities_notified_details: Option<String>,
    pub photos_taken: bool,
    pub video_recorded: bool,

    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub signatures: Vec<Signature>,
    #[serde(default)]
    pub follow_up: FollowUp,

    pub created_by: String,
    pub last_modified_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,

    /// Sensitive fields currently held in encrypted form at rest.
    #[serde(default)]
    pub encrypted_fields: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub redacted_for_export: bool,
}

impl Incident {
    /// Total bytes of attachments already on the record.
    pub fn attachment_bytes(&self) -> u64 {
        self.attachments.iter().map(|a| a.size).sum()
    }

    pub fn is_visible_to(&self, principal: &Principal) -> bool {
        principal.role.is_elevated()
            || self.created_by == principal.id
            || self.staff_involved.iter().any(|s| s == &principal.id)
    }
}

/// Payload for `POST /incidents`. Authorship, identity and timestamps are
/// assigned by the store, never taken from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    #[serde(default)]
    pub status: IncidentStatus,
    pub incident_type: IncidentType,
    pub severity: Severity,

    pub incident_date: NaiveDate,
    pub incident_time: String,
    pub reported_date: NaiveDate,
    pub location: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youth_id: Option<String>,
    pub youth_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youth_dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youth_age: Option<u8>,

    pub summary: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antecedent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequence: Option<String>,

    pub staff_involved: Vec<String>,
    #[serde(default)]
    pub witnesses: Vec<Witness>,
    pub immediate_actions: Vec<ImmediateAction>,

    pub medical_attention_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_details: Option<String>,
    pub parents_notified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents_notified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents_notified_by: Option<String>,
    pub authorities_notified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorities_notified_details: Option<String>,
    pub photos_taken: bool,
    pub video_recorded: bool,

    pub signatures: Vec<Signature>,
    pub follow_up: FollowUp,
}

impl NewIncident {
    /// Build the full record for `principal`.
    pub(crate) fn into_incident(
        self,
        id: String,
        incident_number: String,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Incident {
        Incident {
            id,
            incident_number,
            status: self.status,
            incident_type: self.incident_type,
            severity: self.severity,
            incident_date: self.incident_date,
            incident_time: self.incident_time,
            reported_date: self.reported_date,
            location: self.location,
            youth_id: self.youth_id,
            youth_name: Some(self.youth_name),
            youth_dob: self.youth_dob,
            youth_age: self.youth_age,
            summary: self.summary,
            description: self.description,
            antecedent: self.antecedent,
            behavior: self.behavior,
            consequence: self.consequence,
            staff_involved: self.staff_involved,
            witnesses: self.witnesses,
            immediate_actions: self.immediate_actions,
            medical_attention_required: self.medical_attention_required,
            medical_details: self.medical_details,
            parents_notified: self.parents_notified,
            parents_notified_at: self.parents_notified_at,
            parents_notified_by: self.parents_notified_by,
            authorities_notified: self.authorities_notified,
            authorities_notified_details: self.authorities_notified_details,
            photos_taken: self.photos_taken,
            video_recorded: self.video_recorded,
            attachments: Vec::new(),
            signatures: self.signatures,
            follow_up: self.follow_up,
            created_by: principal.id.clone(),
            last_modified_by: principal.id.clone(),
            created_at: now,
            updated_at: now,
            deleted: false,
            encrypted_fields: BTreeSet::new(),
            redacted_for_export: false,
        }
    }
}

/// Payload for `PATCH /incidents/:id`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_type: Option<IncidentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youth_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youth_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youth_dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youth_age: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antecedent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_involved: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witnesses: Option<Vec<Witness>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_actions: Option<Vec<ImmediateAction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_attention_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents_notified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents_notified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents_notified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorities_notified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorities_notified_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photos_taken: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_recorded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<Signature>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<FollowUp>,
}

/// Caller-supplied list filters, on top of the visibility rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentFilters {
    #[serde(default)]
    pub status: Option<IncidentStatus>,
    #[serde(default)]
    pub incident_type: Option<IncidentType>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub youth_id: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

/// One page of a list query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPage {
    pub incidents: Vec<Incident>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

/// Result of an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportView {
    pub incident: Incident,
    pub anonymized: bool,
}
