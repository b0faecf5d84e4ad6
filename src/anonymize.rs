//! Anonymized export view.
//!
//! Applied only to the decrypted copy returned from an export, never to the
//! stored record.

use crate::model::Incident;

/// Label replacing the subject's name.
pub const ANONYMOUS_SUBJECT: &str = "Youth [ANONYMIZED]";

/// Marker replacing redacted values.
pub const REDACTED: &str = "[REDACTED]";

fn redact(value: &mut Option<String>) {
    if value.is_some() {
        *value = Some(REDACTED.to_string());
    }
}

/// Strip identifying data from a decrypted incident. Idempotent.
///
/// Witness roles and statements are kept; names and contact details are not.
/// The subject's external id is redacted along with the name.
pub fn anonymize(incident: &Incident) -> Incident {
    let mut view = incident.clone();

    view.youth_name = Some(ANONYMOUS_SUBJECT.to_string());
    redact(&mut view.youth_id);
    redact(&mut view.youth_dob);
    view.youth_age = None;
    redact(&mut view.medical_details);
    redact(&mut view.parents_notified_by);

    for witness in view.witnesses.iter_mut() {
        witness.name = REDACTED.to_string();
        redact(&mut witness.contact_info);
    }

    // Which fields were sealed would reveal whether medical details exist.
    view.encrypted_fields.clear();
    view.redacted_for_export = true;
    view
}
