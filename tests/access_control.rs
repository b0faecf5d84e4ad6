mod common;

use incident_vault::model::{AttachmentUpload, IncidentFilters};
use incident_vault::{IncidentError, IncidentPatch, IncidentStatus};

use common::*;

fn pdf(name: &str) -> AttachmentUpload {
    AttachmentUpload {
        filename: name.into(),
        media_type: "application/pdf".into(),
        data: b"%PDF-1.7 test".to_vec(),
    }
}

#[test]
fn test_staff_cannot_see_unrelated_records() {
    let store = store();
    let created = store.create(new_incident("bob"), &staff("bob")).unwrap();
    let alice = staff("alice");

    // Reported as not-found, so existence is not disclosed.
    for result in [
        store.get(&created.id, &alice).map(|_| ()),
        store.export(&created.id, &alice, true).map(|_| ()),
        store
            .update(&created.id, IncidentPatch::default(), &alice)
            .map(|_| ()),
    ] {
        assert!(matches!(result, Err(IncidentError::NotFound(_))));
    }

    let page = store
        .list(IncidentFilters::default(), &alice, None, None)
        .unwrap();
    assert_eq!(page.total, 0);
}

#[test]
fn test_involved_staff_can_read_but_not_edit() {
    let store = store();
    let mut payload = new_incident("bob");
    payload.staff_involved.push("alice".into());
    let created = store.create(payload, &staff("bob")).unwrap();
    let alice = staff("alice");

    assert_eq!(
        store.get(&created.id, &alice).unwrap().youth_name.as_deref(),
        Some(YOUTH_NAME)
    );
    assert!(matches!(
        store.update(&created.id, IncidentPatch::default(), &alice),
        Err(IncidentError::Forbidden(_))
    ));
    assert!(matches!(
        store.add_attachments(&created.id, vec![pdf("a.pdf")], &alice),
        Err(IncidentError::Forbidden(_))
    ));

    let page = store
        .list(IncidentFilters::default(), &alice, None, None)
        .unwrap();
    assert_eq!(page.total, 1);
}

#[test]
fn test_staff_edits_only_drafts() {
    let store = store();
    let alice = staff("alice");
    let created = store.create(new_incident("alice"), &alice).unwrap();

    let submit = IncidentPatch {
        status: Some(IncidentStatus::Submitted),
        ..Default::default()
    };
    let submitted = store.update(&created.id, submit, &alice).unwrap();
    assert_eq!(submitted.status, IncidentStatus::Submitted);

    let edit = IncidentPatch {
        location: Some("Gym".into()),
        ..Default::default()
    };
    assert!(matches!(
        store.update(&created.id, edit.clone(), &alice),
        Err(IncidentError::Forbidden(_))
    ));

    // Supervisors may still edit a submitted record.
    let edited = store.update(&created.id, edit, &supervisor()).unwrap();
    assert_eq!(edited.location, "Gym");
    assert_eq!(edited.last_modified_by, "sup-1");
}

#[test]
fn test_staff_cannot_set_review_statuses() {
    let store = store();
    let alice = staff("alice");
    let created = store.create(new_incident("alice"), &alice).unwrap();

    let resolve = IncidentPatch {
        status: Some(IncidentStatus::Resolved),
        ..Default::default()
    };
    assert!(matches!(
        store.update(&created.id, resolve.clone(), &alice),
        Err(IncidentError::Forbidden(_))
    ));
    assert_eq!(
        store.update(&created.id, resolve, &supervisor()).unwrap().status,
        IncidentStatus::Resolved
    );

    let mut archived = new_incident("alice");
    archived.status = IncidentStatus::Archived;
    assert!(matches!(
        store.create(archived, &alice),
        Err(IncidentError::Forbidden(_))
    ));
}

#[test]
fn test_elevated_roles_see_everything() {
    let store = store();
    store.create(new_incident("alice"), &staff("alice")).unwrap();
    store.create(new_incident("bob"), &staff("bob")).unwrap();

    for principal in [supervisor(), admin()] {
        let page = store
            .list(IncidentFilters::default(), &principal, None, None)
            .unwrap();
        assert_eq!(page.total, 2);
    }
}

#[test]
fn test_audit_log_and_delete_require_elevation() {
    let store = store();
    let alice = staff("alice");
    let created = store.create(new_incident("alice"), &alice).unwrap();

    assert!(matches!(
        store.audit_log(&created.id, &alice),
        Err(IncidentError::Forbidden(_))
    ));
    assert!(matches!(
        store.delete(&created.id, &alice),
        Err(IncidentError::Forbidden(_))
    ));
    assert!(store.audit_log(&created.id, &supervisor()).is_ok());
}

#[test]
fn test_key_rotation_requires_admin() {
    let store = store();
    let old = incident_vault::FieldKey::from_bytes([1u8; 32]);
    assert!(matches!(
        store.rotate_key(&old, &supervisor()),
        Err(IncidentError::Forbidden(_))
    ));
}

#[test]
fn test_listing_redacts_medical_details() {
    let store = store();
    store.create(new_incident("alice"), &staff("alice")).unwrap();

    let page = store
        .list(IncidentFilters::default(), &supervisor(), None, None)
        .unwrap();
    assert_eq!(page.incidents[0].medical_details.as_deref(), Some("[REDACTED]"));
    assert_eq!(page.incidents[0].youth_name.as_deref(), Some(YOUTH_NAME));
}
