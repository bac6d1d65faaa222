//! ---
//! smk_section: "03-persistence-logging"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Snapshot file format: span capture, envelope, replay."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use r_smk_kernel::{KernelError, StorageReader, StorageWriter};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Result, SnapshotError};

/// Current snapshot envelope version.
pub const SNAPSHOT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    version: u16,
    created_at: DateTime<Utc>,
    span_count: usize,
    sha256: String,
    payload: String,
}

/// Collects the byte spans of a Store pass and writes them to a snapshot
/// file.
///
/// The simulator's store pass drives the [`StorageWriter`] implementation;
/// afterwards [`write_to`](SnapshotWriter::write_to) seals the collected
/// spans into a JSON envelope with a SHA-256 integrity digest.
#[derive(Debug, Default)]
pub struct SnapshotWriter {
    spans: Vec<Vec<u8>>,
}

impl SnapshotWriter {
    /// An empty writer ready for a store pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of spans captured so far.
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// Seal the captured spans into a snapshot file at `path`, creating
    /// parent directories as needed.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let payload = frame_spans(&self.spans);
        let envelope = SnapshotEnvelope {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            span_count: self.spans.len(),
            sha256: compute_digest(&payload),
            payload: BASE64.encode(&payload),
        };

        let mut writer = BufWriter::new(File::create(path)?);
        let json = serde_json::to_vec_pretty(&envelope)?;
        writer.write_all(&json)?;
        writer.flush()?;
        tracing::info!(path = %path.display(), spans = self.spans.len(), "snapshot written");
        Ok(())
    }
}

impl StorageWriter for SnapshotWriter {
    fn store(&mut self, span: &[u8]) -> r_smk_kernel::Result<()> {
        self.spans.push(span.to_vec());
        Ok(())
    }
}

/// Replays the spans of a snapshot file through the kernel's
/// [`StorageReader`] contract.
#[derive(Debug)]
pub struct SnapshotReader {
    spans: Vec<Vec<u8>>,
    cursor: usize,
    created_at: DateTime<Utc>,
}

impl SnapshotReader {
    /// Load and verify the snapshot at `path`.
    ///
    /// Fails when the envelope version is unknown, the payload digest does
    /// not match, or the framing is damaged.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        let envelope: SnapshotEnvelope = serde_json::from_slice(&bytes)?;

        if envelope.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(envelope.version));
        }
        let payload = BASE64.decode(envelope.payload.as_bytes())?;
        if compute_digest(&payload) != envelope.sha256 {
            return Err(SnapshotError::ChecksumMismatch);
        }
        let spans = unframe_spans(&payload)?;
        if spans.len() != envelope.span_count {
            return Err(SnapshotError::Malformed("span count disagrees with envelope"));
        }
        tracing::info!(path = %path.display(), spans = spans.len(), "snapshot loaded");
        Ok(Self {
            spans,
            cursor: 0,
            created_at: envelope.created_at,
        })
    }

    /// When the snapshot was written.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Spans not yet consumed by the current replay.
    pub fn remaining(&self) -> usize {
        self.spans.len() - self.cursor
    }

    /// Restart the replay from the first span.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl StorageReader for SnapshotReader {
    fn restore(&mut self, span: &mut [u8]) -> r_smk_kernel::Result<()> {
        let stored = self
            .spans
            .get(self.cursor)
            .ok_or_else(|| KernelError::storage(SnapshotError::Exhausted))?;
        if stored.len() != span.len() {
            return Err(KernelError::storage(SnapshotError::SpanMismatch {
                expected: span.len(),
                actual: stored.len(),
            }));
        }
        span.copy_from_slice(stored);
        self.cursor += 1;
        Ok(())
    }
}

/// Verify the integrity of a snapshot file without replaying it.
pub fn verify_snapshot(path: &Path) -> bool {
    SnapshotReader::from_path(path).is_ok()
}

/// Concatenate spans with u32 little-endian length prefixes.
fn frame_spans(spans: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = spans.iter().map(|s| s.len() + 4).sum();
    let mut payload = Vec::with_capacity(total);
    for span in spans {
        payload.extend_from_slice(&(span.len() as u32).to_le_bytes());
        payload.extend_from_slice(span);
    }
    payload
}

fn unframe_spans(payload: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut spans = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(SnapshotError::Malformed("truncated span length prefix"));
        }
        let (prefix, tail) = rest.split_at(4);
        let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if tail.len() < len {
            return Err(SnapshotError::Malformed("span overruns payload"));
        }
        let (span, tail) = tail.split_at(len);
        spans.push(span.to_vec());
        rest = tail;
    }
    Ok(spans)
}

fn compute_digest(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}
