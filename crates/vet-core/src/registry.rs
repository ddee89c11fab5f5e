//! The state registry, sole owner of every file record and block.
//!
//! All lifecycle transitions go through here: recording an AI edit as a
//! block, arming a file for an incoming edit, and the accept/reject review
//! actions. Callers hold block ids and re-fetch through the registry; the
//! registry never hands out mutable access to a block.
//!
//! Unknown ids are expected (a UI may act on a block resolved elsewhere), so
//! review actions report "not applied" and log instead of returning errors.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::block::{apply_revert, ArmedState, BaseType, Block, BlockStatus, FileRecord, Revert};
use crate::block_id;
use crate::config::EngineConfig;
use crate::diff::{diff_with, join_lines, split_lines, trailing_newline_span, ChangeType};
use crate::path_key::PathKey;

/// Who produced an edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub channel_id: Option<String>,
    pub tool_name: Option<String>,
}

impl Provenance {
    pub fn channel(channel_id: &str) -> Self {
        Self {
            channel_id: Some(channel_id.to_string()),
            tool_name: None,
        }
    }
}

/// Block counters for one file or for the whole registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub files: usize,
    pub total_blocks: usize,
    pub pending: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub invalidated: usize,
    /// Blocks ever created (survives nothing being pending).
    pub created: u64,
    pub lines_added: usize,
    pub lines_deleted: usize,
}

impl Stats {
    fn absorb(&mut self, record: &FileRecord) {
        self.files += 1;
        self.created += record.total_blocks_created;
        for block in record.blocks.values() {
            self.total_blocks += 1;
            self.lines_added += block.lines_added;
            self.lines_deleted += block.lines_deleted;
            match block.status {
                BlockStatus::Pending => self.pending += 1,
                BlockStatus::Accepted => self.accepted += 1,
                BlockStatus::Rejected => self.rejected += 1,
                BlockStatus::Invalidated => self.invalidated += 1,
            }
        }
    }
}

/// In-memory store of all file records and blocks.
#[derive(Debug, Default)]
pub struct StateRegistry {
    files: BTreeMap<PathKey, FileRecord>,
    /// Block id -> owning file.
    block_index: HashMap<String, PathKey>,
    config: EngineConfig,
}

impl StateRegistry {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            files: BTreeMap::new(),
            block_index: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Snapshots and arming
    // -----------------------------------------------------------------------

    /// Record the latest known text of a file, creating its record if needed.
    ///
    /// The first snapshot ever cached becomes the record's original content.
    pub fn cache_snapshot(&mut self, path: &str, text: &str) {
        let now = Utc::now();
        let key = PathKey::new(path);
        match self.files.get_mut(&key) {
            Some(record) => {
                record.current_disk_content = text.to_string();
                record.last_sync_time = now;
            }
            None => {
                debug!(path = %key, "creating file record");
                self.files
                    .insert(key.clone(), FileRecord::new(key, path, text, now));
            }
        }
    }

    /// Arm a file so its next change notification is attributed to the AI.
    ///
    /// The caller should cache the file's current text first; a file with no
    /// record yet gets one with an empty snapshot.
    pub fn mark_file_for_incoming_edit(&mut self, path: &str, channel_id: &str) {
        self.mark_at(path, channel_id, Utc::now());
    }

    fn mark_at(&mut self, path: &str, channel_id: &str, now: DateTime<Utc>) {
        let key = PathKey::new(path);
        let record = self
            .files
            .entry(key.clone())
            .or_insert_with(|| FileRecord::new(key.clone(), path, "", now));
        if let Some(previous) = &record.armed {
            debug!(path = %key, previous = %previous.channel_id, "re-arming file");
        }
        record.armed = Some(ArmedState {
            channel_id: channel_id.to_string(),
            armed_at: now,
        });
        info!(path = %key, channel = channel_id, "file armed for incoming edit");
    }

    /// True if the file is armed and the arming has not expired.
    pub fn is_armed(&self, path: &str) -> bool {
        self.is_armed_at(path, Utc::now())
    }

    fn is_armed_at(&self, path: &str, now: DateTime<Utc>) -> bool {
        let timeout = self.config.arming_timeout();
        self.files
            .get(&PathKey::new(path))
            .and_then(|r| r.armed.as_ref())
            .is_some_and(|armed| !armed.is_expired(now, timeout))
    }

    /// Consume the file's arming, if it is still live.
    ///
    /// Only the first call after arming returns `Some`; an expired arming is
    /// cleared and reported as `None`.
    pub fn take_arming(&mut self, path: &str) -> Option<ArmedState> {
        self.take_arming_at(path, Utc::now())
    }

    fn take_arming_at(&mut self, path: &str, now: DateTime<Utc>) -> Option<ArmedState> {
        let timeout = self.config.arming_timeout();
        let key = PathKey::new(path);
        let armed = self.files.get_mut(&key)?.armed.take()?;
        if armed.is_expired(now, timeout) {
            warn!(path = %key, channel = %armed.channel_id, "arming expired before change arrived");
            return None;
        }
        Some(armed)
    }

    /// Clear the arming of a file without consuming it for an edit.
    pub fn disarm(&mut self, path: &str) -> bool {
        self.files
            .get_mut(&PathKey::new(path))
            .and_then(|r| r.armed.take())
            .is_some()
    }

    /// Watchdog sweep: clear every arming older than the configured timeout.
    ///
    /// Returns how many files were disarmed.
    pub fn expire_stale_arming(&mut self) -> usize {
        self.expire_stale_arming_at(Utc::now())
    }

    fn expire_stale_arming_at(&mut self, now: DateTime<Utc>) -> usize {
        let timeout = self.config.arming_timeout();
        let mut cleared = 0;
        for record in self.files.values_mut() {
            if record
                .armed
                .as_ref()
                .is_some_and(|a| a.is_expired(now, timeout))
            {
                warn!(path = %record.file_path, "clearing stale arming");
                record.armed = None;
                cleared += 1;
            }
        }
        cleared
    }

    // -----------------------------------------------------------------------
    // Block creation
    // -----------------------------------------------------------------------

    /// Turn one AI edit into at most one merged block.
    ///
    /// The block spans from the first changed line to the last, including any
    /// unchanged lines between disjoint hunks. Returns `None` when the texts
    /// do not differ; the cached snapshot is updated either way.
    pub fn record_edit_result(
        &mut self,
        path: &str,
        old_text: &str,
        new_text: &str,
        channel_id: &str,
    ) -> Option<Block> {
        self.record_edit_result_at(
            path,
            old_text,
            new_text,
            Provenance::channel(channel_id),
            Utc::now(),
        )
    }

    /// [`record_edit_result`](Self::record_edit_result) with full provenance.
    pub fn record_edit_result_with(
        &mut self,
        path: &str,
        old_text: &str,
        new_text: &str,
        provenance: Provenance,
    ) -> Option<Block> {
        self.record_edit_result_at(path, old_text, new_text, provenance, Utc::now())
    }

    fn record_edit_result_at(
        &mut self,
        path: &str,
        old_text: &str,
        new_text: &str,
        provenance: Provenance,
        now: DateTime<Utc>,
    ) -> Option<Block> {
        let key = PathKey::new(path);
        let mut spans = diff_with(old_text, new_text, &self.config.diff_options());
        if spans.is_empty() {
            spans.extend(trailing_newline_span(old_text, new_text));
        }

        let record = self
            .files
            .entry(key.clone())
            .or_insert_with(|| FileRecord::new(key.clone(), path, old_text, now));
        record.current_disk_content = new_text.to_string();
        record.last_sync_time = now;
        record.armed = None;

        let (first, last) = match (spans.first(), spans.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                debug!(path = %key, "edit produced no changes");
                return None;
            }
        };

        let first_start = first.start_line;
        let last_end = last.end_line;
        let total_deleted: usize = spans.iter().map(|s| s.deleted_lines.len()).sum();
        let total_added: usize = spans.iter().map(|s| s.added_lines.len()).sum();

        let old_lines = split_lines(old_text);
        let new_lines = split_lines(new_text);
        let new_end = first_start + (last_end - first_start) + total_added - total_deleted;
        let base = &old_lines[first_start..last_end];
        let current = &new_lines[first_start..new_end];

        let separator_line = first_start;
        let end_line = separator_line + current.len();
        let delta = current.len() as isize - base.len() as isize;

        // Earlier blocks touching this region are stale; later ones move.
        let mut chained_from: Option<(DateTime<Utc>, String)> = None;
        let mut superseded: Vec<(DateTime<Utc>, String)> = Vec::new();
        for block in record.blocks.values_mut() {
            match block.status {
                BlockStatus::Pending if block.overlaps(first_start, last_end) => {
                    block.status = BlockStatus::Invalidated;
                    block.processed_at = Some(now);
                    block.last_modified = now;
                    superseded.push((block.created_at, block.id.clone()));
                    info!(path = %key, block_id = %block.id, "pending block superseded");
                }
                BlockStatus::Accepted if block.overlaps(first_start, last_end) => {
                    if chained_from
                        .as_ref()
                        .map_or(true, |(at, _)| block.created_at > *at)
                    {
                        chained_from = Some((block.created_at, block.id.clone()));
                    }
                }
                BlockStatus::Pending | BlockStatus::Accepted if block.separator_line >= last_end => {
                    block.shift(delta);
                }
                _ => {}
            }
        }

        let id = block_id::generate_unique(&key, first_start, now.timestamp_millis(), |id| {
            self.block_index.contains_key(id)
        });
        let (base_type, base_block_id) = match chained_from {
            Some((_, parent)) => (BaseType::Accepted, Some(parent)),
            None => (BaseType::Original, None),
        };
        superseded.sort();

        let block = Block {
            id: id.clone(),
            file_path: path.to_string(),
            start_line: separator_line,
            separator_line,
            end_line,
            base_content: join_lines(base),
            current_content: join_lines(current),
            base_type,
            base_block_id,
            supersedes: superseded.into_iter().map(|(_, id)| id).collect(),
            base_trailing_newline: (last_end >= old_lines.len()).then(|| old_text.ends_with('\n')),
            status: BlockStatus::Pending,
            created_at: now,
            last_modified: now,
            processed_at: None,
            change_type: ChangeType::from_counts(base.len(), current.len()),
            lines_added: current.len(),
            lines_deleted: base.len(),
            ai_channel_id: provenance.channel_id,
            ai_tool_name: provenance.tool_name,
        };

        info!(
            path = %key,
            block_id = %id,
            hunks = spans.len(),
            lines_added = block.lines_added,
            lines_deleted = block.lines_deleted,
            "recorded AI edit block"
        );
        record.insert_block(block.clone());
        self.block_index.insert(id, key);
        Some(block)
    }

    // -----------------------------------------------------------------------
    // Review actions
    // -----------------------------------------------------------------------

    /// Accept a pending block. The document already holds its post-image,
    /// so only bookkeeping changes.
    ///
    /// Returns `false` for unknown or already-resolved blocks.
    pub fn accept(&mut self, block_id: &str) -> bool {
        let now = Utc::now();
        let Some(record) = self.record_for_block_mut(block_id) else {
            warn!(block_id, "accept: block not found");
            return false;
        };
        let Some(block) = record.blocks.get_mut(block_id).filter(|b| b.is_pending()) else {
            debug!(block_id, "accept: block already resolved");
            return false;
        };

        block.status = BlockStatus::Accepted;
        block.processed_at = Some(now);
        block.last_modified = now;
        record.total_blocks_accepted += 1;
        info!(path = %record.file_path, block_id, "block accepted");
        true
    }

    /// Reject a pending block and return how to revert it in the document.
    ///
    /// The caller writes the revert back to the file. The cached snapshot is
    /// updated here, and other blocks below the region are shifted so their
    /// coordinates match the reverted text.
    pub fn reject(&mut self, block_id: &str) -> Option<Revert> {
        let now = Utc::now();
        let Some(record) = self.record_for_block_mut(block_id) else {
            warn!(block_id, "reject: block not found");
            return None;
        };
        let Some(block) = record.blocks.get_mut(block_id).filter(|b| b.is_pending()) else {
            debug!(block_id, "reject: block already resolved");
            return None;
        };

        block.status = BlockStatus::Rejected;
        block.processed_at = Some(now);
        block.last_modified = now;
        let revert = block.revert();
        record.total_blocks_rejected += 1;

        let delta = revert.base_lines.len() as isize
            - (revert.end_line - revert.separator_line) as isize;
        for other in record.blocks.values_mut() {
            let live = matches!(other.status, BlockStatus::Pending | BlockStatus::Accepted);
            if live && other.id != block_id && other.separator_line >= revert.end_line {
                other.shift(delta);
            }
        }
        record.sort_order();
        record.current_disk_content = apply_revert(&record.current_disk_content, &revert);
        record.last_sync_time = now;

        info!(path = %record.file_path, block_id, "block rejected");
        Some(revert)
    }

    /// Mark a pending block as superseded without touching the document.
    pub fn invalidate(&mut self, block_id: &str) -> bool {
        let now = Utc::now();
        let Some(block) = self
            .record_for_block_mut(block_id)
            .and_then(|r| r.blocks.get_mut(block_id))
            .filter(|b| b.is_pending())
        else {
            warn!(block_id, "invalidate: no pending block with this id");
            return false;
        };
        block.status = BlockStatus::Invalidated;
        block.processed_at = Some(now);
        block.last_modified = now;
        true
    }

    /// Accept every pending block of a file. Returns how many changed.
    pub fn accept_all(&mut self, path: &str) -> usize {
        let ids: Vec<String> = self
            .list_pending_blocks(path)
            .into_iter()
            .map(|b| b.id)
            .collect();
        ids.iter().filter(|id| self.accept(id)).count()
    }

    /// Reject every pending block of a file.
    ///
    /// Reverts are returned bottom-up (descending `separator_line`) so that
    /// applying them in order never shifts a revert still to be applied.
    pub fn reject_all(&mut self, path: &str) -> Vec<Revert> {
        let mut pending = self.list_pending_blocks(path);
        pending.sort_by(|a, b| b.separator_line.cmp(&a.separator_line));
        pending
            .iter()
            .filter_map(|block| self.reject(&block.id))
            .collect()
    }

    /// Accept every pending block in every file.
    pub fn accept_all_pending(&mut self) -> usize {
        let ids: Vec<String> = self
            .files
            .values()
            .flat_map(|r| r.pending_blocks().map(|b| b.id.clone()))
            .collect();
        let accepted = ids.iter().filter(|id| self.accept(id)).count();
        if accepted > 0 {
            info!(accepted, "accepted all pending blocks");
        }
        accepted
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Pending blocks of a file in navigation order (ascending `start_line`).
    pub fn list_pending_blocks(&self, path: &str) -> Vec<Block> {
        self.file_record(path)
            .map(|r| r.pending_blocks().cloned().collect())
            .unwrap_or_default()
    }

    /// Every file with at least one pending block, with those blocks.
    pub fn list_all_pending_files(&self) -> BTreeMap<PathKey, Vec<Block>> {
        self.files
            .iter()
            .filter_map(|(key, record)| {
                let pending: Vec<Block> = record.pending_blocks().cloned().collect();
                (!pending.is_empty()).then(|| (key.clone(), pending))
            })
            .collect()
    }

    pub fn get_block(&self, block_id: &str) -> Option<&Block> {
        let key = self.block_index.get(block_id)?;
        self.files.get(key)?.block(block_id)
    }

    pub fn file_record(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(&PathKey::new(path))
    }

    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn block_count(&self) -> usize {
        self.block_index.len()
    }

    /// Counters for one file, or for every file when `path` is `None`.
    pub fn get_stats(&self, path: Option<&str>) -> Stats {
        let mut stats = Stats::default();
        match path {
            Some(path) => {
                if let Some(record) = self.file_record(path) {
                    stats.absorb(record);
                }
            }
            None => self.files.values().for_each(|r| stats.absorb(r)),
        }
        stats
    }

    // -----------------------------------------------------------------------
    // Reset and restore
    // -----------------------------------------------------------------------

    /// Drop all records and blocks.
    pub fn clear(&mut self) {
        self.files.clear();
        self.block_index.clear();
    }

    /// Drop one file's record and its blocks.
    pub fn clear_file(&mut self, path: &str) -> bool {
        let key = PathKey::new(path);
        match self.files.remove(&key) {
            Some(record) => {
                for id in record.blocks.keys() {
                    self.block_index.remove(id);
                }
                true
            }
            None => false,
        }
    }

    /// Insert a fully built record, indexing its blocks.
    pub(crate) fn insert_record(&mut self, record: FileRecord) {
        for id in record.blocks.keys() {
            self.block_index.insert(id.clone(), record.file_path.clone());
        }
        self.files.insert(record.file_path.clone(), record);
    }

    fn record_for_block_mut(&mut self, block_id: &str) -> Option<&mut FileRecord> {
        let key = self.block_index.get(block_id)?;
        self.files.get_mut(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::apply_revert;
    use crate::diff::diff;

    const PATH: &str = "/work/src/lib.rs";

    fn registry() -> StateRegistry {
        StateRegistry::new(EngineConfig::default())
    }

    #[test]
    fn test_record_single_modify() {
        let mut reg = registry();
        let block = reg
            .record_edit_result(PATH, "a\nb\nc\n", "a\nB\nc\n", "chan-1")
            .unwrap();

        assert_eq!(block.start_line, 1);
        assert_eq!(block.separator_line, 1);
        assert_eq!(block.end_line, 2);
        assert_eq!(block.base_content, "b");
        assert_eq!(block.current_content, "B");
        assert_eq!(block.change_type, ChangeType::Modify);
        assert_eq!(block.status, BlockStatus::Pending);
        assert_eq!(block.ai_channel_id.as_deref(), Some("chan-1"));
        assert!(block_id::is_well_formed(&block.id));

        let record = reg.file_record(PATH).unwrap();
        assert_eq!(record.total_blocks_created(), 1);
        assert_eq!(record.original_content(), "a\nb\nc\n");
        assert_eq!(record.current_disk_content(), "a\nB\nc\n");
    }

    #[test]
    fn test_no_change_creates_no_block_but_updates_cache() {
        let mut reg = registry();
        reg.cache_snapshot(PATH, "old\n");
        assert!(reg
            .record_edit_result(PATH, "same\n", "same\n", "c")
            .is_none());
        assert_eq!(reg.file_record(PATH).unwrap().current_disk_content(), "same\n");
        assert_eq!(reg.block_count(), 0);
    }

    #[test]
    fn test_new_file_content_block() {
        let mut reg = registry();
        let block = reg.record_edit_result(PATH, "", "x\ny\n", "c").unwrap();
        assert_eq!(block.change_type, ChangeType::Add);
        assert_eq!(block.base_content, "");
        assert!(block.is_new_content());
        assert_eq!((block.separator_line, block.end_line), (0, 2));
    }

    #[test]
    fn test_disjoint_hunks_merge_into_one_block() {
        let mut reg = registry();
        let old = "a\nb\nc\nd\ne\n";
        let new = "A\nb\nc\nd\nE\n";
        assert_eq!(diff(old, new).len(), 2);

        let block = reg.record_edit_result(PATH, old, new, "c").unwrap();
        assert_eq!((block.separator_line, block.end_line), (0, 5));
        assert_eq!(block.base_content, "a\nb\nc\nd\ne");
        assert_eq!(block.current_content, "A\nb\nc\nd\nE");
        assert_eq!(reg.list_pending_blocks(PATH).len(), 1);
    }

    #[test]
    fn test_window_with_net_growth() {
        let mut reg = registry();
        let old = "1\n2\n3\n4\n";
        let new = "1\nx\ny\n3\nz\n4\n";
        let block = reg.record_edit_result(PATH, old, new, "c").unwrap();
        assert_eq!(block.base_content, "2\n3");
        assert_eq!(block.current_content, "x\ny\n3\nz");
        assert_eq!((block.separator_line, block.end_line), (1, 5));
        assert_eq!(block.lines_deleted, 2);
        assert_eq!(block.lines_added, 4);
    }

    #[test]
    fn test_accept_is_idempotent() {
        let mut reg = registry();
        let id = reg
            .record_edit_result(PATH, "a\n", "b\n", "c")
            .unwrap()
            .id;

        assert!(reg.accept(&id));
        let first_processed = reg.get_block(&id).unwrap().processed_at;
        assert!(first_processed.is_some());

        assert!(!reg.accept(&id));
        assert_eq!(reg.get_block(&id).unwrap().processed_at, first_processed);
        assert_eq!(reg.file_record(PATH).unwrap().total_blocks_accepted(), 1);
        assert!(reg.reject(&id).is_none());
    }

    #[test]
    fn test_unknown_block_is_noop() {
        let mut reg = registry();
        assert!(!reg.accept("block-deadbeef-L0-T0"));
        assert!(reg.reject("block-deadbeef-L0-T0").is_none());
        assert!(!reg.invalidate("nope"));
    }

    #[test]
    fn test_reject_restores_exactly() {
        let mut reg = registry();
        let old = "a\nb\nc\n";
        let new = "a\nB\nc\n";
        let id = reg.record_edit_result(PATH, old, new, "c").unwrap().id;

        let revert = reg.reject(&id).unwrap();
        assert_eq!(revert.base_content, "b");
        assert_eq!((revert.separator_line, revert.end_line), (1, 2));

        let restored = apply_revert(new, &revert);
        assert_eq!(restored, old);
        assert!(diff(old, &restored).is_empty());

        let record = reg.file_record(PATH).unwrap();
        assert_eq!(record.current_disk_content(), old);
        assert_eq!(record.total_blocks_rejected(), 1);
        assert_eq!(reg.get_block(&id).unwrap().status, BlockStatus::Rejected);
    }

    #[test]
    fn test_reject_deleted_blank_line() {
        let mut reg = registry();
        let old = "a\n\nb\n";
        let new = "a\nb\n";
        let id = reg.record_edit_result(PATH, old, new, "c").unwrap().id;
        let block = reg.get_block(&id).unwrap();
        assert_eq!(block.base_content, "");
        assert_eq!(block.lines_deleted, 1);
        assert!(!block.is_new_content());

        let revert = reg.reject(&id).unwrap();
        assert_eq!(apply_revert(new, &revert), old);
    }

    #[test]
    fn test_final_newline_only_edit_is_reviewable() {
        let mut reg = registry();
        let block = reg.record_edit_result(PATH, "a\nb", "a\nb\n", "c").unwrap();
        assert_eq!((block.separator_line, block.end_line), (1, 2));
        assert_eq!(block.base_trailing_newline, Some(false));

        let revert = reg.reject(&block.id).unwrap();
        assert_eq!(apply_revert("a\nb\n", &revert), "a\nb");
        assert_eq!(reg.file_record(PATH).unwrap().current_disk_content(), "a\nb");
    }

    #[test]
    fn test_reject_append_restores_missing_final_newline() {
        let mut reg = registry();
        let block = reg.record_edit_result(PATH, "x", "x\ny\n", "c").unwrap();
        let revert = reg.reject(&block.id).unwrap();
        assert_eq!(apply_revert("x\ny\n", &revert), "x");
        assert_eq!(reg.file_record(PATH).unwrap().current_disk_content(), "x");
    }

    #[test]
    fn test_second_edit_below_shifts_and_above_invalidates() {
        let mut reg = registry();
        let v0 = "a\nb\nc\nd\ne\nf\n";
        let v1 = "a\nb\nc\nd\nE1\nE2\nf\n";
        let lower = reg.record_edit_result(PATH, v0, v1, "c1").unwrap();
        assert_eq!((lower.separator_line, lower.end_line), (4, 6));

        // Insert two lines at the top: lower block moves down by two.
        let v2 = "x\ny\na\nb\nc\nd\nE1\nE2\nf\n";
        let upper = reg.record_edit_result(PATH, v1, v2, "c2").unwrap();
        assert_eq!((upper.separator_line, upper.end_line), (0, 2));

        let lower_now = reg.get_block(&lower.id).unwrap();
        assert_eq!(lower_now.status, BlockStatus::Pending);
        assert_eq!((lower_now.separator_line, lower_now.end_line), (6, 8));

        // Rewrite the lower region: the lower block is superseded.
        let v3 = "x\ny\na\nb\nc\nd\nZ\nf\n";
        let replacement = reg.record_edit_result(PATH, v2, v3, "c3").unwrap();
        assert_eq!(
            reg.get_block(&lower.id).unwrap().status,
            BlockStatus::Invalidated
        );
        assert_eq!(replacement.base_type, BaseType::Original);
        assert_eq!(replacement.supersedes, vec![lower.id.clone()]);
        assert_eq!(replacement.base_content, "E1\nE2");
        assert!(upper.supersedes.is_empty());

        let pending: Vec<String> = reg
            .list_pending_blocks(PATH)
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(pending, vec![upper.id, replacement.id]);
    }

    #[test]
    fn test_edit_over_accepted_block_chains() {
        let mut reg = registry();
        let first = reg
            .record_edit_result(PATH, "a\nb\nc\n", "a\nB\nc\n", "c1")
            .unwrap();
        assert!(reg.accept(&first.id));

        let second = reg
            .record_edit_result(PATH, "a\nB\nc\n", "a\nBB\nc\n", "c2")
            .unwrap();
        assert_eq!(second.base_type, BaseType::Accepted);
        assert_eq!(second.base_block_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(second.base_content, "B");
    }

    #[test]
    fn test_reject_all_descending_order() {
        let mut reg = registry();
        let v0 = "1\n2\n3\n4\n5\n6\n7\n";
        let v1 = "1\nTWO\n3\n4\n5\n6\n7\n";
        let v2 = "1\nTWO\n3\n4\n5\nSIX\nSIX2\n7\n";
        reg.record_edit_result(PATH, v0, v1, "c").unwrap();
        reg.record_edit_result(PATH, v1, v2, "c").unwrap();
        assert_eq!(reg.list_pending_blocks(PATH).len(), 2);

        let reverts = reg.reject_all(PATH);
        assert_eq!(reverts.len(), 2);
        assert!(reverts[0].separator_line > reverts[1].separator_line);

        let mut text = v2.to_string();
        for revert in &reverts {
            text = apply_revert(&text, revert);
        }
        assert_eq!(text, v0);
        assert_eq!(reg.file_record(PATH).unwrap().current_disk_content(), v0);
        assert!(reg.list_pending_blocks(PATH).is_empty());
    }

    #[test]
    fn test_single_reject_shifts_lower_block() {
        let mut reg = registry();
        let v0 = "1\n2\n3\n4\n";
        let v1 = "1\nA\nB\nC\n3\n4\n";
        let v2 = "1\nA\nB\nC\n3\nD\n";
        let upper = reg.record_edit_result(PATH, v0, v1, "c").unwrap();
        let lower = reg.record_edit_result(PATH, v1, v2, "c").unwrap();
        assert_eq!(lower.separator_line, 5);

        let revert = reg.reject(&upper.id).unwrap();
        let text = apply_revert(v2, &revert);
        assert_eq!(text, "1\n2\n3\nD\n");

        let lower_now = reg.get_block(&lower.id).unwrap().clone();
        assert_eq!((lower_now.separator_line, lower_now.end_line), (3, 4));
        let revert = reg.reject(&lower.id).unwrap();
        assert_eq!(apply_revert(&text, &revert), v0);
    }

    #[test]
    fn test_accept_all_and_global() {
        let mut reg = registry();
        reg.record_edit_result("/a.txt", "1\n", "2\n", "c").unwrap();
        reg.record_edit_result("/b.txt", "1\n", "2\n", "c").unwrap();
        reg.record_edit_result("/b.txt", "2\n", "2\n3\n", "c").unwrap();

        assert_eq!(reg.list_all_pending_files().len(), 2);
        assert_eq!(reg.accept_all("/b.txt"), 2);
        assert_eq!(reg.list_all_pending_files().len(), 1);
        assert_eq!(reg.accept_all_pending(), 1);
        assert!(reg.list_all_pending_files().is_empty());

        let stats = reg.get_stats(None);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.created, 3);
    }

    #[test]
    fn test_pending_blocks_in_start_line_order() {
        let mut reg = registry();
        let v0 = "1\n2\n3\n4\n5\n";
        let v1 = "1\n2\n3\n4\nFIVE\n";
        let v2 = "ONE\n2\n3\n4\nFIVE\n";
        reg.record_edit_result(PATH, v0, v1, "c").unwrap();
        reg.record_edit_result(PATH, v1, v2, "c").unwrap();

        let starts: Vec<usize> = reg
            .list_pending_blocks(PATH)
            .iter()
            .map(|b| b.start_line)
            .collect();
        assert_eq!(starts, vec![0, 4]);
    }

    #[test]
    fn test_arming_lifecycle() {
        let mut reg = registry();
        let t0 = Utc::now();
        reg.cache_snapshot(PATH, "a\n");
        reg.mark_at(PATH, "chan", t0);
        assert!(reg.is_armed_at(PATH, t0 + chrono::Duration::seconds(5)));
        assert_eq!(
            reg.file_record(PATH).unwrap().marked_channel_id(),
            Some("chan")
        );

        let armed = reg
            .take_arming_at(PATH, t0 + chrono::Duration::seconds(5))
            .unwrap();
        assert_eq!(armed.channel_id, "chan");
        assert!(reg.take_arming_at(PATH, t0).is_none());
    }

    #[test]
    fn test_arming_expires() {
        let mut reg = registry();
        let t0 = Utc::now();
        reg.mark_at(PATH, "chan", t0);
        reg.mark_at("/other.txt", "chan", t0 + chrono::Duration::seconds(20));

        let later = t0 + chrono::Duration::seconds(31);
        assert!(!reg.is_armed_at(PATH, later));
        assert_eq!(reg.expire_stale_arming_at(later), 1);
        assert!(!reg.file_record(PATH).unwrap().is_marked_for_ai_edit());
        assert!(reg.file_record("/other.txt").unwrap().is_marked_for_ai_edit());

        reg.mark_at(PATH, "chan", t0);
        assert!(reg.take_arming_at(PATH, later).is_none());
        assert!(!reg.file_record(PATH).unwrap().is_marked_for_ai_edit());
    }

    #[test]
    fn test_path_spellings_share_record() {
        let mut reg = registry();
        reg.record_edit_result("/work/src/../src/lib.rs", "a\n", "b\n", "c")
            .unwrap();
        assert_eq!(reg.list_pending_blocks("/work/src/lib.rs").len(), 1);
        assert_eq!(reg.file_count(), 1);
    }

    #[test]
    fn test_clear_file_and_clear() {
        let mut reg = registry();
        let id = reg.record_edit_result("/a.txt", "1\n", "2\n", "c").unwrap().id;
        reg.record_edit_result("/b.txt", "1\n", "2\n", "c").unwrap();

        assert!(reg.clear_file("/a.txt"));
        assert!(reg.get_block(&id).is_none());
        assert_eq!(reg.file_count(), 1);

        reg.clear();
        assert_eq!(reg.file_count(), 0);
        assert_eq!(reg.block_count(), 0);
    }

    #[test]
    fn test_block_ids_unique_within_same_millisecond() {
        let mut reg = registry();
        let now = Utc::now();
        let a = reg
            .record_edit_result_at(PATH, "1\n", "2\n", Provenance::default(), now)
            .unwrap();
        reg.accept(&a.id);
        let b = reg
            .record_edit_result_at(PATH, "2\n", "3\n", Provenance::default(), now)
            .unwrap();
        assert_ne!(a.id, b.id);
    }
}
