//! Artifact records and identifiers.

use serde::{Deserialize, Serialize};

use crate::error::{FilesError, FilesResult};

/// The literal identifier prefix every artifact id carries.
pub const ID_PREFIX: &str = "file-";

/// Metadata of one uploaded artifact, persisted as a JSON side object next
/// to the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// `file-` followed by hex.
    pub id: String,
    /// Name the file was uploaded under.
    pub original_filename: String,
    /// Declared media type.
    pub media_type: String,
    /// Payload size.
    pub size_bytes: u64,
    /// Unix timestamp of the upload.
    pub created: u64,
    /// Caller-declared purpose, used as a listing filter.
    pub purpose: String,
    /// Processing state.
    pub status: ArtifactStatus,
}

/// Artifact processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Uploaded,
    Processed,
    Error,
}

impl ArtifactRecord {
    /// Object-store key of the payload: `files/<id>-<sanitized_filename>`.
    pub fn object_key(&self) -> String {
        format!("files/{}-{}", self.id, sanitize_filename(&self.original_filename))
    }

    /// Object-store key of this metadata record.
    pub fn metadata_key(&self) -> String {
        metadata_key(&self.id)
    }

    /// Upload timestamp in ISO-8601, for the context preamble.
    pub fn created_iso8601(&self) -> String {
        jiff::Timestamp::from_second(self.created as i64)
            .map(|ts| ts.to_string())
            .unwrap_or_else(|_| self.created.to_string())
    }
}

pub(crate) fn metadata_key(id: &str) -> String {
    format!("files/{id}.json")
}

/// Mints a fresh artifact id.
pub(crate) fn new_id() -> String {
    format!("{ID_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

/// Rejects ids that do not carry the literal prefix.
pub fn validate_id(id: &str) -> FilesResult<()> {
    if !id.starts_with(ID_PREFIX) {
        return Err(FilesError::Validation(format!(
            "Invalid file id '{id}': expected the '{ID_PREFIX}' prefix"
        )));
    }

    Ok(())
}

/// Keeps object keys flat and predictable: path separators and control
/// characters are replaced, everything else alphanumeric-ish survives.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}
