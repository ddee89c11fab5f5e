//! The host-facing entry point.
//!
//! A [`Tracker`] pairs the [`StateRegistry`] with a [`DocumentHost`], the
//! editor or filesystem that owns the actual text. The registry decides what
//! a change means; the tracker fetches text before arming and writes reverted
//! text back after a reject.

use tracing::{debug, info};

use crate::block::{apply_revert, Block, Revert};
use crate::config::EngineConfig;
use crate::error::VetResult;
use crate::markers::{encode_blocks, parse_markers, EncodedMarkers, ParsedMarkers};
use crate::persist::{restore_state, snapshot_state, RestoreOutcome, STATE_KEY};
use crate::registry::{Provenance, StateRegistry, Stats};
use crate::store::BlobStore;
use crate::validate::{validate_markers, ValidationReport};

/// Access to document text, supplied by the embedding editor.
pub trait DocumentHost {
    /// The current full text of `path`, from an open buffer or from disk.
    fn read_text(&self, path: &str) -> VetResult<String>;

    /// Replace the full text of `path`. Returns once the write is durable.
    fn write_text(&mut self, path: &str, text: &str) -> VetResult<()>;
}

pub struct Tracker<H: DocumentHost> {
    registry: StateRegistry,
    host: H,
}

impl<H: DocumentHost> Tracker<H> {
    pub fn new(host: H, config: EngineConfig) -> Self {
        Self {
            registry: StateRegistry::new(config),
            host,
        }
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    // -----------------------------------------------------------------------
    // Edit capture
    // -----------------------------------------------------------------------

    /// Snapshot a file's current text and arm it for an AI edit on `channel_id`.
    pub fn mark_file_for_incoming_edit(&mut self, path: &str, channel_id: &str) -> VetResult<()> {
        let text = self.host.read_text(path)?;
        self.registry.cache_snapshot(path, &text);
        self.registry.mark_file_for_incoming_edit(path, channel_id);
        Ok(())
    }

    /// Handle a content-changed notification for `path`.
    ///
    /// The first notification with new text after arming consumes the arming
    /// and is recorded as an AI edit. Anything else is a user edit and only
    /// refreshes the cached snapshot.
    pub fn on_file_changed(&mut self, path: &str, new_text: &str) -> Option<Block> {
        let cached = self
            .registry
            .file_record(path)
            .map(|r| r.current_disk_content().to_string());
        if cached.as_deref() == Some(new_text) {
            debug!(path, "change notification with unchanged text");
            return None;
        }

        match self.registry.take_arming(path) {
            Some(armed) => {
                let old_text = cached.unwrap_or_default();
                self.registry
                    .record_edit_result(path, &old_text, new_text, &armed.channel_id)
            }
            None => {
                self.registry.cache_snapshot(path, new_text);
                None
            }
        }
    }

    /// Record an edit for which the caller already holds both snapshots.
    pub fn record_edit_result(
        &mut self,
        path: &str,
        old_text: &str,
        new_text: &str,
        provenance: Provenance,
    ) -> Option<Block> {
        self.registry
            .record_edit_result_with(path, old_text, new_text, provenance)
    }

    pub fn is_armed(&self, path: &str) -> bool {
        self.registry.is_armed(path)
    }

    /// Watchdog tick: clear armings that never saw their change.
    pub fn expire_stale_arming(&mut self) -> usize {
        self.registry.expire_stale_arming()
    }

    // -----------------------------------------------------------------------
    // Review
    // -----------------------------------------------------------------------

    pub fn accept(&mut self, block_id: &str) -> bool {
        self.registry.accept(block_id)
    }

    pub fn accept_all(&mut self, path: &str) -> usize {
        self.registry.accept_all(path)
    }

    pub fn accept_all_pending(&mut self) -> usize {
        self.registry.accept_all_pending()
    }

    /// Reject a block and write its pre-image back through the host.
    ///
    /// The document is written first; if the host fails, the block stays
    /// pending and the cached snapshot is untouched. Returns `Ok(None)` when
    /// the block is unknown or already resolved.
    pub fn reject_and_revert(&mut self, block_id: &str) -> VetResult<Option<Revert>> {
        let Some(block) = self.registry.get_block(block_id).filter(|b| b.is_pending()) else {
            return Ok(None);
        };
        let path = block.file_path.clone();
        let revert = block.revert();

        let text = self.host.read_text(&path)?;
        let reverted = apply_revert(&text, &revert);
        self.host.write_text(&path, &reverted)?;

        self.registry.reject(block_id);
        self.registry.cache_snapshot(&path, &reverted);
        info!(path = %path, block_id, "reverted block in document");
        Ok(Some(revert))
    }

    /// Reject every pending block of `path` and write the result once.
    ///
    /// Nothing is marked rejected unless the write succeeds.
    pub fn reject_all_and_revert(&mut self, path: &str) -> VetResult<Vec<Revert>> {
        let mut pending = self.registry.list_pending_blocks(path);
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        pending.sort_by(|a, b| b.separator_line.cmp(&a.separator_line));

        let text = self.host.read_text(path)?;
        let reverted = pending
            .iter()
            .fold(text, |doc, block| apply_revert(&doc, &block.revert()));
        self.host.write_text(path, &reverted)?;

        let reverts = self.registry.reject_all(path);
        self.registry.cache_snapshot(path, &reverted);
        info!(path, count = reverts.len(), "reverted all blocks in document");
        Ok(reverts)
    }

    // -----------------------------------------------------------------------
    // Queries and markers
    // -----------------------------------------------------------------------

    pub fn list_pending_blocks(&self, path: &str) -> Vec<Block> {
        self.registry.list_pending_blocks(path)
    }

    pub fn get_block(&self, block_id: &str) -> Option<&Block> {
        self.registry.get_block(block_id)
    }

    pub fn get_stats(&self, path: Option<&str>) -> Stats {
        self.registry.get_stats(path)
    }

    /// The cached text of `path` with every pending block rendered as markers.
    pub fn encode_as_markers(&self, path: &str) -> Option<EncodedMarkers> {
        let record = self.registry.file_record(path)?;
        let pending: Vec<Block> = record.pending_blocks().cloned().collect();
        Some(encode_blocks(record.current_disk_content(), &pending))
    }

    pub fn decode_markers(&self, text: &str) -> ParsedMarkers {
        parse_markers(text)
    }

    pub fn validate_markers(&self, text: &str) -> ValidationReport {
        validate_markers(text)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Save the registry to `store`. Returns false if the snapshot was too
    /// large and nothing was written.
    pub fn save_snapshot(&self, store: &mut impl BlobStore) -> VetResult<bool> {
        match snapshot_state(&self.registry)? {
            Some(data) => {
                store.put(STATE_KEY, &data)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace the registry with the snapshot in `store`, if there is one.
    pub fn load_snapshot(&mut self, store: &impl BlobStore) -> VetResult<Option<RestoreOutcome>> {
        let Some(data) = store.get(STATE_KEY)? else {
            return Ok(None);
        };
        Ok(Some(restore_state(&mut self.registry, &data)))
    }

    /// Drop all tracked state.
    pub fn clear(&mut self) {
        self.registry.clear();
    }
}
