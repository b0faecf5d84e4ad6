//! Minimal example: one incident from draft to anonymized export.
//!
//! Demonstrates field encryption, role-scoped access and the audit trail
//! mirrored to a JSON-lines file.
//! Run with: `cargo run --example incident_walkthrough`

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;

use incident_vault::api::Router;
use incident_vault::{IncidentConfig, IncidentStore, Principal, Role};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Setup: a random raw key and a file mirror for the audit trail.
    let key = incident_vault::crypto::generate_random_key()?;
    let audit_path = std::env::temp_dir().join("incident_audit.jsonl");
    let config = IncidentConfig {
        encryption_key: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, key),
        audit_log_path: Some(audit_path.clone()),
        ..IncidentConfig::default()
    };
    let router = Router::new(Arc::new(IncidentStore::from_config(&config)?));

    let alice = Principal::new("alice", Role::Staff);
    let bob = Principal::new("bob", Role::Staff);
    let supervisor = Principal::new("sam", Role::Supervisor);

    // 2. Staff files a report.
    let today = NaiveDate::from_ymd_opt(2026, 3, 14).ok_or("bad date")?;
    let now = Utc::now();
    let created = router.handle(
        "POST",
        "/incidents",
        Some(&alice),
        Some(json!({
            "incidentType": "aggression",
            "severity": "medium",
            "incidentDate": today,
            "incidentTime": "14:05",
            "reportedDate": today,
            "location": "Dorm B common room",
            "youthName": "Jordan Smith",
            "youthDob": "2010-04-02",
            "summary": "Verbal altercation escalated to shoving",
            "description": "Two residents argued over the television remote and one pushed the other before staff intervened.",
            "staffInvolved": ["alice"],
            "immediateActions": [{ "timestamp": now, "action": "Separated residents", "staffId": "alice" }],
            "medicalAttentionRequired": false,
            "parentsNotified": false,
            "authoritiesNotified": false,
            "photosTaken": false,
            "videoRecorded": false,
            "signatures": [{ "signerId": "alice", "signerName": "Alice Nguyen", "data": "sig", "signedAt": now }],
            "followUp": { "required": false }
        })),
    );
    println!("create -> {}", created.status);
    let id = created.body["id"].as_str().ok_or("no id")?.to_string();
    println!("incident number: {}", created.body["incidentNumber"]);

    // 3. Another staff member cannot see it at all.
    let denied = router.handle("GET", &format!("/incidents/{}", id), Some(&bob), None);
    println!("bob reads -> {}", denied.status);

    // 4. The supervisor exports an anonymized copy.
    let export = router.handle(
        "POST",
        &format!("/incidents/{}/export", id),
        Some(&supervisor),
        Some(json!({ "anonymize": true })),
    );
    println!("anonymized subject: {}", export.body["incident"]["youthName"]);

    // 5. Every action is on the record.
    let log = router.handle(
        "GET",
        &format!("/incidents/{}/audit-log", id),
        Some(&supervisor),
        None,
    );
    if let Some(entries) = log.body.as_array() {
        for entry in entries {
            println!("  {} by {}", entry["action"], entry["actorId"]);
        }
    }

    println!("Audit log persisted to: {}", audit_path.display());
    Ok(())
}
