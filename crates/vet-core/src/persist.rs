//! Versioned snapshots of the whole registry.
//!
//! The envelope is JSON: `{ version, timestamp, file_states: [...] }`, each
//! file state carrying its blocks in review order. Loading is all-or-nothing:
//! a version mismatch or an unreadable blob leaves the registry empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::block::{Block, BlockStatus, FileRecord};
use crate::error::VetResult;
use crate::path_key::PathKey;
use crate::registry::StateRegistry;

/// Schema version written into every envelope. Loads require an exact match.
pub const SCHEMA_VERSION: &str = "1.0";

/// Logical key snapshots are stored under in a [`BlobStore`](crate::store::BlobStore).
pub const STATE_KEY: &str = "vet-state";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: String,
    timestamp: DateTime<Utc>,
    file_states: Vec<FileState>,
}

#[derive(Debug, Deserialize)]
struct VersionProbe {
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileState {
    file_path: PathKey,
    display_path: String,
    original_content: String,
    current_disk_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_hash: Option<String>,
    last_sync_time: DateTime<Utc>,
    blocks: Vec<Block>,
}

impl FileState {
    fn capture(record: &FileRecord) -> Self {
        Self {
            file_path: record.file_path.clone(),
            display_path: record.display_path.clone(),
            original_content: record.original_content.clone(),
            current_disk_content: record.current_disk_content.clone(),
            content_hash: Some(record.content_hash.clone()),
            last_sync_time: record.last_sync_time,
            blocks: record.blocks_in_order().cloned().collect(),
        }
    }

    fn rebuild(self) -> FileRecord {
        let mut record = FileRecord::new(
            self.file_path,
            &self.display_path,
            &self.original_content,
            self.last_sync_time,
        );
        record.current_disk_content = self.current_disk_content;
        if let Some(hash) = self.content_hash {
            record.content_hash = hash;
        }
        for block in self.blocks {
            match block.status {
                BlockStatus::Accepted => record.total_blocks_accepted += 1,
                BlockStatus::Rejected => record.total_blocks_rejected += 1,
                BlockStatus::Pending | BlockStatus::Invalidated => {}
            }
            record.insert_block(block);
        }
        record
    }
}

/// What [`restore_state`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored { files: usize, blocks: usize },
    /// The blob was written by another schema version and was discarded.
    VersionMismatch { found: String },
    /// The blob could not be decoded and was discarded.
    Malformed,
}

impl RestoreOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, RestoreOutcome::Restored { .. })
    }
}

/// Serialize every record in `registry`.
///
/// Returns `Ok(None)` without producing anything when the encoded snapshot
/// exceeds the configured size ceiling.
pub fn snapshot_state(registry: &StateRegistry) -> VetResult<Option<Vec<u8>>> {
    snapshot_state_at(registry, Utc::now())
}

fn snapshot_state_at(registry: &StateRegistry, now: DateTime<Utc>) -> VetResult<Option<Vec<u8>>> {
    let envelope = Envelope {
        version: SCHEMA_VERSION.to_string(),
        timestamp: now,
        file_states: registry.files().map(FileState::capture).collect(),
    };
    let data = serde_json::to_vec(&envelope)?;

    let limit = registry.config().max_snapshot_bytes;
    if data.len() > limit {
        warn!(bytes = data.len(), limit, "snapshot exceeds size limit, skipping save");
        return Ok(None);
    }
    Ok(Some(data))
}

/// Replace the registry's contents with a decoded snapshot.
///
/// The registry is cleared first; anything but [`RestoreOutcome::Restored`]
/// leaves it empty.
pub fn restore_state(registry: &mut StateRegistry, blob: &[u8]) -> RestoreOutcome {
    registry.clear();

    let probe: VersionProbe = match serde_json::from_slice(blob) {
        Ok(probe) => probe,
        Err(e) => {
            warn!(error = %e, "snapshot unreadable, starting fresh");
            return RestoreOutcome::Malformed;
        }
    };
    if probe.version != SCHEMA_VERSION {
        warn!(
            found = %probe.version,
            expected = SCHEMA_VERSION,
            "snapshot schema mismatch, starting fresh"
        );
        return RestoreOutcome::VersionMismatch {
            found: probe.version,
        };
    }

    let envelope: Envelope = match serde_json::from_slice(blob) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "snapshot body malformed, starting fresh");
            return RestoreOutcome::Malformed;
        }
    };

    let files = envelope.file_states.len();
    let mut blocks = 0;
    for state in envelope.file_states {
        let record = state.rebuild();
        blocks += record.block_count();
        registry.insert_record(record);
    }
    info!(files, blocks, saved_at = %envelope.timestamp, "state restored");
    RestoreOutcome::Restored { files, blocks }
}
