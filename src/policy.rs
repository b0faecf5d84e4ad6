//! Role-based access decisions.
//!
//! [`authorize`] is a pure function of the principal, the operation and the
//! facts of the target record. It is called uniformly by the incident store
//! for every read, write and export.
//!
//! Records a staff member cannot see are reported as [`Decision::NotVisible`]
//! (surfaced as not-found). A visible record the principal may not act on
//! is [`Decision::Forbidden`].

use serde::Deserialize;
use serde_json::Value;

use crate::codec::Document;
use crate::error::{IncidentError, Result};
use crate::model::{IncidentStatus, Principal};

/// The operations gated by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create { status: IncidentStatus },
    List,
    Get,
    /// `status` is the status the update would set, if any.
    Update { status: Option<IncidentStatus> },
    AddAttachments,
    Export,
    ViewAudit,
    Delete,
    RotateKeys,
}

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    NotVisible,
    Forbidden(&'static str),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Turn a denial into the matching error for record `id`.
    pub fn into_result(self, id: &str) -> Result<()> {
        match self {
            Self::Allow => Ok(()),
            Self::NotVisible => Err(IncidentError::NotFound(format!("incident {}", id))),
            Self::Forbidden(reason) => Err(IncidentError::Forbidden(reason.to_string())),
        }
    }
}

/// The non-sensitive attributes the policy needs. Read straight from the
/// stored document, so no decryption happens before the gate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFacts {
    pub created_by: String,
    #[serde(default)]
    pub staff_involved: Vec<String>,
    pub status: IncidentStatus,
    #[serde(default)]
    pub deleted: bool,
}

impl RecordFacts {
    pub fn from_document(doc: &Document) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(doc.clone()))?)
    }
}

/// Which records a principal may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    All,
    /// Only records created by, or involving, this principal id.
    Scoped(String),
}

impl Visibility {
    pub fn admits(&self, created_by: &str, staff_involved: &[String]) -> bool {
        match self {
            Self::All => true,
            Self::Scoped(id) => created_by == id || staff_involved.iter().any(|s| s == id),
        }
    }
}

pub fn visibility(principal: &Principal) -> Visibility {
    if principal.role.is_elevated() {
        Visibility::All
    } else {
        Visibility::Scoped(principal.id.clone())
    }
}

/// Decide whether `principal` may perform `op` on `record`.
///
/// `record` is `None` when the target does not exist (or for `Create` and
/// `List`, which have no single target).
pub fn authorize(principal: &Principal, op: Operation, record: Option<&RecordFacts>) -> Decision {
    let elevated = principal.role.is_elevated();

    match op {
        Operation::Create { status } => {
            if elevated || status.staff_settable() {
                Decision::Allow
            } else {
                Decision::Forbidden("staff may only create draft or submitted incidents")
            }
        }
        Operation::List => Decision::Allow,
        Operation::ViewAudit if !elevated => {
            Decision::Forbidden("audit log requires supervisor or admin")
        }
        Operation::RotateKeys => {
            if matches!(principal.role, crate::model::Role::Admin) {
                Decision::Allow
            } else {
                Decision::Forbidden("key rotation requires admin")
            }
        }
        _ => {
            let facts = match record {
                Some(facts) if !facts.deleted => facts,
                _ => return Decision::NotVisible,
            };
            if !visibility(principal).admits(&facts.created_by, &facts.staff_involved) {
                return Decision::NotVisible;
            }
            if elevated {
                return Decision::Allow;
            }

            let is_creator = facts.created_by == principal.id;
            match op {
                Operation::Get | Operation::Export => Decision::Allow,
                Operation::AddAttachments if is_creator => Decision::Allow,
                Operation::AddAttachments => {
                    Decision::Forbidden("only the creator may attach files")
                }
                Operation::Update { status } => {
                    if !is_creator {
                        Decision::Forbidden("staff may only update their own incidents")
                    } else if facts.status != IncidentStatus::Draft {
                        Decision::Forbidden("staff may only update incidents in draft")
                    } else if status.map_or(false, |s| !s.staff_settable()) {
                        Decision::Forbidden("status change requires supervisor or admin")
                    } else {
                        Decision::Allow
                    }
                }
                _ => Decision::Forbidden("operation requires supervisor or admin"),
            }
        }
    }
}
