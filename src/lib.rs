//! # incident-vault
//!
//! Protected storage for youth-care incident reports.
//!
//! Sensitive fields (subject name, date of birth, medical details) are
//! encrypted individually before a record is persisted and decrypted only
//! for callers the role policy admits. Every create, view, update, export
//! and attachment action lands in an append-only audit trail.
//!
//! ## Public API
//!
//! - [`IncidentStore`]: the orchestrator every operation goes through.
//! - [`KeyManager`] / [`FieldKey`]: the active field key and rotation.
//! - [`FieldCodec`]: record-level seal/open of the sensitive fields.
//! - [`policy::authorize`]: pure role-based access decisions.
//! - [`AuditTrail`]: append-only action log with forward sinks.
//! - [`api::Router`]: transport-agnostic HTTP route table.

pub mod anonymize;
pub mod api;
pub mod audit;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod incident;
pub mod keys;
pub mod model;
pub mod policy;
pub mod schema;
pub mod store;

pub use audit::{AuditAction, AuditLogEntry, AuditTrail, ExportMode};
pub use codec::{FieldCodec, SealedRecord, SensitiveField};
pub use config::IncidentConfig;
pub use error::{IncidentError, Result};
pub use incident::{IncidentStore, RotationReport};
pub use keys::{FieldKey, KeyManager};
pub use model::{Incident, IncidentPatch, IncidentStatus, NewIncident, Principal, Role};

/// Generate a fresh random field key.
///
/// The returned key is suitable for `KeyManager::with_key`. Production
/// deployments should source keys from a secret manager instead.
pub fn generate_field_key() -> Result<FieldKey> {
    let bytes = crypto::generate_random_key()?;
    Ok(FieldKey::from_bytes(bytes))
}
