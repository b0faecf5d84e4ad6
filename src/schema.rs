//! Payload validation.
//!
//! Field-level rules are shared verbatim between create and partial-update
//! validation. Cross-field refinements (medical details, parent and
//! authority notification) run on create only: a PATCH is checked field by
//! field against whatever it carries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{ImmediateAction, IncidentPatch, NewIncident, Signature, Witness};

pub const SUMMARY_MIN: usize = 10;
pub const SUMMARY_MAX: usize = 200;
pub const DESCRIPTION_MIN: usize = 50;

/// One failed rule, keyed by the camelCase field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

/// All rule failures for a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub issues: Vec<FieldIssue>,
}

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(FieldIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Whether any issue names `field`.
    pub fn mentions(&self, field: &str) -> bool {
        self.issues.iter().any(|i| i.field == field)
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.issues.iter().map(|i| i.field.as_str()).collect();
        write!(f, "{}", fields.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Field rules
// ---------------------------------------------------------------------------

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn check_non_empty(errors: &mut ValidationErrors, field: &str, value: &str) {
    if blank(value) {
        errors.push(field, "must not be empty");
    }
}

fn check_time(errors: &mut ValidationErrors, value: &str) {
    let valid = match value.split_once(':') {
        Some((h, m)) if h.len() == 2 && m.len() == 2 => matches!(
            (h.parse::<u8>(), m.parse::<u8>()),
            (Ok(h), Ok(m)) if h < 24 && m < 60
        ),
        _ => false,
    };
    if !valid {
        errors.push("incidentTime", "must be HH:MM");
    }
}

fn check_summary(errors: &mut ValidationErrors, value: &str) {
    let len = value.trim().chars().count();
    if !(SUMMARY_MIN..=SUMMARY_MAX).contains(&len) {
        errors.push(
            "summary",
            format!("must be {}-{} characters", SUMMARY_MIN, SUMMARY_MAX),
        );
    }
}

fn check_description(errors: &mut ValidationErrors, value: &str) {
    if value.trim().chars().count() < DESCRIPTION_MIN {
        errors.push(
            "description",
            format!("must be at least {} characters", DESCRIPTION_MIN),
        );
    }
}

fn check_staff(errors: &mut ValidationErrors, staff: &[String]) {
    if staff.is_empty() {
        errors.push("staffInvolved", "at least one staff member is required");
    }
    for (i, s) in staff.iter().enumerate() {
        check_non_empty(errors, &format!("staffInvolved[{}]", i), s);
    }
}

fn check_witnesses(errors: &mut ValidationErrors, witnesses: &[Witness]) {
    for (i, w) in witnesses.iter().enumerate() {
        check_non_empty(errors, &format!("witnesses[{}].name", i), &w.name);
        check_non_empty(errors, &format!("witnesses[{}].role", i), &w.role);
    }
}

fn check_actions(errors: &mut ValidationErrors, actions: &[ImmediateAction]) {
    if actions.is_empty() {
        errors.push("immediateActions", "at least one action is required");
    }
    for (i, a) in actions.iter().enumerate() {
        check_non_empty(errors, &format!("immediateActions[{}].action", i), &a.action);
        check_non_empty(errors, &format!("immediateActions[{}].staffId", i), &a.staff_id);
    }
}

fn check_signatures(errors: &mut ValidationErrors, signatures: &[Signature]) {
    if signatures.is_empty() {
        errors.push("signatures", "at least one signature is required");
    }
    for (i, s) in signatures.iter().enumerate() {
        check_non_empty(errors, &format!("signatures[{}].signerId", i), &s.signer_id);
        check_non_empty(errors, &format!("signatures[{}].signerName", i), &s.signer_name);
        check_non_empty(errors, &format!("signatures[{}].data", i), &s.data);
    }
}

fn missing(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, blank)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Full validation of a create payload, including cross-field rules.
pub fn validate_new(payload: &NewIncident) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    check_time(&mut errors, &payload.incident_time);
    check_non_empty(&mut errors, "location", &payload.location);
    check_non_empty(&mut errors, "youthName", &payload.youth_name);
    check_summary(&mut errors, &payload.summary);
    check_description(&mut errors, &payload.description);
    check_staff(&mut errors, &payload.staff_involved);
    check_witnesses(&mut errors, &payload.witnesses);
    check_actions(&mut errors, &payload.immediate_actions);
    check_signatures(&mut errors, &payload.signatures);

    if payload.medical_attention_required && missing(&payload.medical_details) {
        errors.push("medicalDetails", "required when medical attention was required");
    }
    if payload.parents_notified {
        if payload.parents_notified_at.is_none() {
            errors.push("parentsNotifiedAt", "required when parents were notified");
        }
        if missing(&payload.parents_notified_by) {
            errors.push("parentsNotifiedBy", "required when parents were notified");
        }
    }
    if payload.authorities_notified && missing(&payload.authorities_notified_details) {
        errors.push(
            "authoritiesNotifiedDetails",
            "required when authorities were notified",
        );
    }

    errors.into_result()
}

/// Field-level validation of whatever a partial update carries.
pub fn validate_patch(patch: &IncidentPatch) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if let Some(time) = &patch.incident_time {
        check_time(&mut errors, time);
    }
    if let Some(location) = &patch.location {
        check_non_empty(&mut errors, "location", location);
    }
    if let Some(name) = &patch.youth_name {
        check_non_empty(&mut errors, "youthName", name);
    }
    if let Some(summary) = &patch.summary {
        check_summary(&mut errors, summary);
    }
    if let Some(description) = &patch.description {
        check_description(&mut errors, description);
    }
    if let Some(staff) = &patch.staff_involved {
        check_staff(&mut errors, staff);
    }
    if let Some(witnesses) = &patch.witnesses {
        check_witnesses(&mut errors, witnesses);
    }
    if let Some(actions) = &patch.immediate_actions {
        check_actions(&mut errors, actions);
    }
    if let Some(signatures) = &patch.signatures {
        check_signatures(&mut errors, signatures);
    }

    errors.into_result()
}
