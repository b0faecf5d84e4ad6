//! Startup configuration.
//!
//! Defaults cover everything except the encryption secret, which must come
//! from the environment (or an explicit value) before the store can start.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{IncidentError, Result};
use crate::keys::DEFAULT_KDF_SALT;

pub const ENV_ENCRYPTION_KEY: &str = "INCIDENT_ENCRYPTION_KEY";
pub const ENV_KEY_VERSION: &str = "INCIDENT_KEY_VERSION";
pub const ENV_KDF_SALT: &str = "INCIDENT_KDF_SALT";
pub const ENV_AUDIT_LOG: &str = "INCIDENT_AUDIT_LOG";

/// Limits enforced on attachment uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentLimits {
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    pub max_files_per_upload: usize,
    pub allowed_media_types: Vec<String>,
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 5 * 1024 * 1024,
            max_total_bytes: 10 * 1024 * 1024,
            max_files_per_upload: 10,
            allowed_media_types: ["image/jpeg", "image/png", "image/gif", "application/pdf"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl AttachmentLimits {
    pub fn allows(&self, media_type: &str) -> bool {
        self.allowed_media_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(media_type))
    }
}

/// Everything the incident store needs at startup.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncidentConfig {
    /// Raw base64 key (>= 32 bytes) or passphrase.
    pub encryption_key: String,
    pub key_version: u8,
    pub kdf_salt: String,
    pub attachments: AttachmentLimits,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Optional JSON-lines mirror of the audit trail.
    pub audit_log_path: Option<PathBuf>,
}

impl Default for IncidentConfig {
    fn default() -> Self {
        Self {
            encryption_key: String::new(),
            key_version: 1,
            kdf_salt: DEFAULT_KDF_SALT.to_string(),
            attachments: AttachmentLimits::default(),
            default_page_size: 20,
            max_page_size: 100,
            audit_log_path: None,
        }
    }
}

impl std::fmt::Debug for IncidentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncidentConfig")
            .field("encryption_key", &"[REDACTED]")
            .field("key_version", &self.key_version)
            .field("attachments", &self.attachments)
            .field("default_page_size", &self.default_page_size)
            .field("max_page_size", &self.max_page_size)
            .field("audit_log_path", &self.audit_log_path)
            .finish()
    }
}

impl IncidentConfig {
    /// Defaults overlaid with `INCIDENT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        config.encryption_key = lookup(ENV_ENCRYPTION_KEY)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| IncidentError::Config(format!("{} is not set", ENV_ENCRYPTION_KEY)))?;

        if let Some(version) = lookup(ENV_KEY_VERSION) {
            config.key_version = version
                .trim()
                .parse()
                .map_err(|_| IncidentError::Config(format!("{} must be 0-255", ENV_KEY_VERSION)))?;
        }
        if let Some(salt) = lookup(ENV_KDF_SALT).filter(|v| !v.is_empty()) {
            config.kdf_salt = salt;
        }
        config.audit_log_path = lookup(ENV_AUDIT_LOG)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(config)
    }
}
