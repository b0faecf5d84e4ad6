//! Error types for incident-vault.
//!
//! Every variant is a distinct failure mode of the protected-record core.
//! Messages are intentionally minimal: they signal *what* failed without
//! echoing key material, ciphertext internals or sensitive plaintext.

use thiserror::Error;

use crate::schema::ValidationErrors;

/// Result type for every fallible operation in the crate.
pub type Result<T> = std::result::Result<T, IncidentError>;

/// The single error type for all incident-vault operations.
#[derive(Debug, Error)]
pub enum IncidentError {
    /// Schema or cross-field validation failed.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// No authenticated principal accompanied the request.
    #[error("authentication required")]
    AuthenticationMissing,

    /// The principal may see the record but not perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The record does not exist or is outside the principal's visibility.
    #[error("not found: {0}")]
    NotFound(String),

    /// Authentication tag check failed. Tampered data or the wrong key.
    #[error("integrity check failed")]
    Integrity,

    /// An encrypted value could not be parsed.
    #[error("malformed encrypted value: {0}")]
    Format(String),

    /// Startup configuration is unusable (e.g. empty secret).
    #[error("configuration error: {0}")]
    Config(String),

    /// A key was requested before `KeyManager::initialize` ran.
    #[error("key manager not initialized")]
    NotInitialized,

    /// The record, audit or blob store reported a failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    Randomness,

    /// The AEAD seal operation failed.
    #[error("encryption failed")]
    Encryption,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IncidentError {
    /// HTTP status code for this error on the operation surface.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::AuthenticationMissing => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Integrity
            | Self::Format(_)
            | Self::Config(_)
            | Self::NotInitialized
            | Self::Storage(_)
            | Self::Randomness
            | Self::Encryption
            | Self::Serialization(_) => 500,
        }
    }

    /// Shorthand used by the store seams.
    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}
