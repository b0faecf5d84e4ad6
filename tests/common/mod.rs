//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{NaiveDate, TimeZone, Utc};

use incident_vault::model::{
    FollowUp, ImmediateAction, IncidentType, Severity, Signature, Witness,
};
use incident_vault::{IncidentStore, KeyManager, NewIncident, Principal, Role};

/// A raw base64 secret, so tests skip the PBKDF2 stretch.
pub fn raw_secret(fill: u8) -> String {
    STANDARD.encode([fill; 32])
}

pub fn key_manager(fill: u8, version: u8) -> Arc<KeyManager> {
    Arc::new(KeyManager::from_secret(&raw_secret(fill), version, "test-salt").unwrap())
}

pub fn store() -> IncidentStore {
    IncidentStore::in_memory(key_manager(1, 1)).unwrap()
}

pub fn staff(id: &str) -> Principal {
    Principal::new(id, Role::Staff)
}

pub fn supervisor() -> Principal {
    Principal::new("sup-1", Role::Supervisor)
}

pub fn admin() -> Principal {
    Principal::new("admin-1", Role::Admin)
}

pub const YOUTH_NAME: &str = "Jordan Smith";
pub const YOUTH_DOB: &str = "2010-04-02";
pub const MEDICAL: &str = "Ice pack applied to left wrist";

/// A create payload that passes every validation rule.
pub fn new_incident(author: &str) -> NewIncident {
    let at = Utc.with_ymd_and_hms(2026, 3, 14, 14, 10, 0).unwrap();
    let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
    NewIncident {
        status: Default::default(),
        incident_type: IncidentType::Aggression,
        severity: Severity::Medium,
        incident_date: date,
        incident_time: "14:05".into(),
        reported_date: date,
        location: "Dorm B common room".into(),
        youth_id: Some("Y-17".into()),
        youth_name: YOUTH_NAME.into(),
        youth_dob: Some(YOUTH_DOB.into()),
        youth_age: Some(15),
        summary: "Verbal altercation escalated to shoving".into(),
        description: "During free time two residents argued over the television remote; \
                      one resident pushed the other before staff intervened."
            .into(),
        antecedent: None,
        behavior: None,
        consequence: None,
        staff_involved: vec![author.into()],
        witnesses: vec![Witness {
            name: "Casey Doe".into(),
            role: "peer".into(),
            contact_info: Some("555-0100".into()),
            statement: Some("Saw the argument start".into()),
        }],
        immediate_actions: vec![ImmediateAction {
            timestamp: at,
            action: "Separated residents".into(),
            staff_id: author.into(),
            notes: None,
        }],
        medical_attention_required: true,
        medical_details: Some(MEDICAL.into()),
        parents_notified: true,
        parents_notified_at: Some(at),
        parents_notified_by: Some("Alice Nguyen".into()),
        authorities_notified: false,
        authorities_notified_details: None,
        photos_taken: false,
        video_recorded: false,
        signatures: vec![Signature {
            signer_id: author.into(),
            signer_name: "Alice Nguyen".into(),
            data: "data:image/png;base64,AAAA".into(),
            signed_at: at,
        }],
        follow_up: FollowUp::default(),
    }
}
