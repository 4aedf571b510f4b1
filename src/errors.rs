//! Registry error types.
//!
//! Every failure the node registry can report is a [`RegistryError`]
//! variant.  Save failures are recovered locally (the in-memory set is
//! rolled back) and surfaced to the requesting connection through the
//! `Display` text; load failures are fatal to startup.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while loading or saving the node registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A freshly generated identifier is already present in the set.
    ///
    /// Uniqueness is enforced on identifier only; duplicate `(host, port)`
    /// pairs are accepted.
    #[error("node {id} already exists")]
    AlreadyExists { id: Uuid },

    /// The node set could not be serialized.
    #[error("encoding failed: {0}")]
    EncodingFailed(#[source] serde_json::Error),

    /// The serialized node set could not be written to the backing file.
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// The backing file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The backing file exists but does not hold a valid node array.
    #[error("failed to decode {path}: {source}")]
    DecodeError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The backing file lists the same identifier twice.
    #[error("failed to decode {path}: duplicate node id {id}")]
    DuplicateId { path: PathBuf, id: Uuid },

    /// A previous save panicked while holding the registry lock.
    #[error("registry lock poisoned")]
    Poisoned,

    /// The blocking task running the save did not complete.
    #[error("save task failed: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
}

impl RegistryError {
    /// Short, stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::AlreadyExists { .. } => "already_exists",
            RegistryError::EncodingFailed(_) => "encoding_failed",
            RegistryError::WriteFailed(_) => "write_failed",
            RegistryError::ReadFailed { .. } => "read_failed",
            RegistryError::DecodeError { .. } => "decode_error",
            RegistryError::DuplicateId { .. } => "duplicate_id",
            RegistryError::Poisoned => "poisoned",
            RegistryError::Interrupted(_) => "interrupted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_failed_display_includes_cause() {
        let err = RegistryError::WriteFailed(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        ));
        assert_eq!(err.to_string(), "write failed: read-only filesystem");
        assert_eq!(err.kind(), "write_failed");
    }

    #[test]
    fn test_duplicate_id_display() {
        let id = Uuid::nil();
        let err = RegistryError::DuplicateId {
            path: PathBuf::from("nodes.json"),
            id,
        };
        assert_eq!(
            err.to_string(),
            "failed to decode nodes.json: duplicate node id 00000000-0000-0000-0000-000000000000"
        );
    }
}
