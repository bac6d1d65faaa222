//! ---
//! smk_section: "03-persistence-logging"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Snapshot persistence for simulation state."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
#![warn(missing_docs)]

/// Result alias used throughout the persistence crate.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Error type for the snapshot subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Wrapper for IO errors encountered while reading/writing snapshot files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues in the snapshot envelope.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Reported when the payload is not valid base64.
    #[error("payload decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Reported when a snapshot fails integrity verification.
    #[error("snapshot checksum mismatch")]
    ChecksumMismatch,
    /// Reported when the envelope carries a version this build cannot read.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u16),
    /// Reported when the payload framing does not match the envelope.
    #[error("malformed snapshot: {0}")]
    Malformed(&'static str),
    /// Reported when a restore pass reads past the recorded spans.
    #[error("no spans left to restore")]
    Exhausted,
    /// Reported when a restored span's length differs from the request.
    #[error("span length mismatch: requested {expected} bytes, stored {actual}")]
    SpanMismatch {
        /// Bytes the caller asked for.
        expected: usize,
        /// Bytes the snapshot holds at this position.
        actual: usize,
    },
}

pub mod snapshot;

pub use snapshot::{verify_snapshot, SnapshotReader, SnapshotWriter, SNAPSHOT_VERSION};
