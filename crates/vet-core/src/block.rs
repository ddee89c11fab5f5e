//! Blocks and file records: the data the review engine tracks.
//!
//! A [`Block`] is one AI-proposed change that a human accepts or rejects as
//! a unit. A [`FileRecord`] holds every block for one file along with the
//! cached text snapshots used to diff the next AI edit.
//!
//! Both types are read-only outside the crate: all mutation goes through
//! [`StateRegistry`](crate::registry::StateRegistry).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::{render_lines, split_lines, ChangeType};
use crate::hash::hash_str;
use crate::path_key::PathKey;

/// Review status of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    /// Awaiting a decision.
    Pending,
    /// Kept; the document already holds the post-image.
    Accepted,
    /// Reverted to the pre-image.
    Rejected,
    /// Superseded by a later AI edit before it was reviewed.
    Invalidated,
}

impl BlockStatus {
    /// True for every status a block cannot leave.
    pub fn is_terminal(self) -> bool {
        self != BlockStatus::Pending
    }
}

/// Where a block's pre-image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseType {
    /// Not derived from an accepted block. When the edit superseded pending
    /// blocks, the pre-image also holds their unreviewed text; those blocks
    /// are listed in [`Block::supersedes`].
    Original,
    /// The post-image of a previously accepted block.
    Accepted,
}

/// One reviewable AI edit region within a file.
///
/// Line numbers are 0-based offsets into the current document.
/// `[separator_line, end_line)` holds the post-image lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    /// Display form of the path, as the caller spelled it.
    pub file_path: String,
    pub start_line: usize,
    pub separator_line: usize,
    pub end_line: usize,
    /// Pre-image text, lines joined by `\n`. Empty for new content.
    pub base_content: String,
    /// Post-image text currently in the document.
    pub current_content: String,
    pub base_type: BaseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_block_id: Option<String>,
    /// Pending blocks this edit invalidated, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supersedes: Vec<String>,
    /// Whether the pre-image document ended with `\n`. Only recorded when the
    /// block reaches the end of the file, where a revert must restore it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_trailing_newline: Option<bool>,
    pub status: BlockStatus,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    pub change_type: ChangeType,
    pub lines_added: usize,
    pub lines_deleted: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_tool_name: Option<String>,
}

impl Block {
    pub fn is_pending(&self) -> bool {
        self.status == BlockStatus::Pending
    }

    /// True when the block has no pre-image and should render as new content
    /// rather than as an empty deletion.
    pub fn is_new_content(&self) -> bool {
        self.lines_deleted == 0
    }

    /// Pre-image as lines. A block that deleted one blank line has
    /// `base_content == ""` but one base line, so the count decides.
    pub fn base_lines(&self) -> Vec<&str> {
        content_lines(&self.base_content, self.lines_deleted)
    }

    /// Post-image as lines.
    pub fn current_lines(&self) -> Vec<&str> {
        content_lines(&self.current_content, self.lines_added)
    }

    /// Whether `[start, end)` intersects this block's document region.
    ///
    /// A zero-width region (an insertion point) overlaps only a region that
    /// strictly contains it, or another insertion point at the same line.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        let (a_start, a_end) = (self.separator_line, self.end_line);
        match (a_start == a_end, start == end) {
            (true, true) => a_start == start,
            (true, false) => start < a_start && a_start < end,
            (false, true) => a_start < start && start < a_end,
            (false, false) => start < a_end && a_start < end,
        }
    }

    /// What a caller needs to splice this block's pre-image back in.
    pub fn revert(&self) -> Revert {
        Revert {
            block_id: self.id.clone(),
            base_content: self.base_content.clone(),
            base_lines: self.base_lines().into_iter().map(String::from).collect(),
            separator_line: self.separator_line,
            end_line: self.end_line,
            trailing_newline: self.base_trailing_newline,
        }
    }

    pub(crate) fn shift(&mut self, delta: isize) {
        self.start_line = self.start_line.saturating_add_signed(delta);
        self.separator_line = self.separator_line.saturating_add_signed(delta);
        self.end_line = self.end_line.saturating_add_signed(delta);
    }
}

fn content_lines(content: &str, count: usize) -> Vec<&str> {
    if count == 0 {
        Vec::new()
    } else {
        content.split('\n').collect()
    }
}

/// Instructions for reverting one rejected block in the document.
///
/// Replace lines `[separator_line, end_line)` with `base_lines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revert {
    pub block_id: String,
    pub base_content: String,
    pub base_lines: Vec<String>,
    pub separator_line: usize,
    pub end_line: usize,
    /// Trailing-newline state to restore when the region ends the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_newline: Option<bool>,
}

/// Splice a revert into `text`.
///
/// The document keeps its trailing-newline convention unless the region runs
/// to the end of the document and the revert records the pre-image's.
/// Out-of-range coordinates are clamped to the document.
pub fn apply_revert(text: &str, revert: &Revert) -> String {
    let lines = split_lines(text);
    let end = revert.end_line.min(lines.len());
    let start = revert.separator_line.min(end);

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + revert.base_lines.len());
    out.extend_from_slice(&lines[..start]);
    out.extend(revert.base_lines.iter().map(String::as_str));
    out.extend_from_slice(&lines[end..]);

    let trailing = match revert.trailing_newline {
        Some(restore) if revert.end_line >= lines.len() => restore,
        _ => text.is_empty() || text.ends_with('\n'),
    };
    render_lines(&out, trailing)
}

/// A file armed to receive an AI edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedState {
    pub channel_id: String,
    pub armed_at: DateTime<Utc>,
}

impl ArmedState {
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.armed_at >= timeout
    }
}

/// Everything tracked for one file.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub(crate) file_path: PathKey,
    pub(crate) display_path: String,
    pub(crate) original_content: String,
    pub(crate) current_disk_content: String,
    pub(crate) blocks: HashMap<String, Block>,
    pub(crate) block_order: Vec<String>,
    pub(crate) armed: Option<ArmedState>,
    pub(crate) total_blocks_created: u64,
    pub(crate) total_blocks_accepted: u64,
    pub(crate) total_blocks_rejected: u64,
    pub(crate) content_hash: String,
    pub(crate) last_sync_time: DateTime<Utc>,
}

impl FileRecord {
    pub(crate) fn new(key: PathKey, display_path: &str, snapshot: &str, now: DateTime<Utc>) -> Self {
        Self {
            file_path: key,
            display_path: display_path.to_string(),
            original_content: snapshot.to_string(),
            current_disk_content: snapshot.to_string(),
            blocks: HashMap::new(),
            block_order: Vec::new(),
            armed: None,
            total_blocks_created: 0,
            total_blocks_accepted: 0,
            total_blocks_rejected: 0,
            content_hash: hash_str(snapshot),
            last_sync_time: now,
        }
    }

    pub fn file_path(&self) -> &PathKey {
        &self.file_path
    }

    pub fn display_path(&self) -> &str {
        &self.display_path
    }

    /// The first snapshot taken before any AI edit.
    pub fn original_content(&self) -> &str {
        &self.original_content
    }

    /// The latest known document text.
    pub fn current_disk_content(&self) -> &str {
        &self.current_disk_content
    }

    /// SHA-256 of `original_content`.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn last_sync_time(&self) -> DateTime<Utc> {
        self.last_sync_time
    }

    pub fn total_blocks_created(&self) -> u64 {
        self.total_blocks_created
    }

    pub fn total_blocks_accepted(&self) -> u64 {
        self.total_blocks_accepted
    }

    pub fn total_blocks_rejected(&self) -> u64 {
        self.total_blocks_rejected
    }

    pub fn is_marked_for_ai_edit(&self) -> bool {
        self.armed.is_some()
    }

    pub fn marked_channel_id(&self) -> Option<&str> {
        self.armed.as_ref().map(|a| a.channel_id.as_str())
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// All blocks in review order (ascending `start_line`).
    pub fn blocks_in_order(&self) -> impl Iterator<Item = &Block> {
        self.block_order.iter().filter_map(|id| self.blocks.get(id))
    }

    /// Pending blocks in review order.
    pub fn pending_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks_in_order().filter(|b| b.is_pending())
    }

    /// True if `text` hashes to the recorded original snapshot.
    pub fn matches_original(&self, text: &str) -> bool {
        hash_str(text) == self.content_hash
    }

    pub(crate) fn insert_block(&mut self, block: Block) {
        let id = block.id.clone();
        if self.blocks.insert(id.clone(), block).is_none() {
            self.block_order.push(id);
        }
        self.sort_order();
        self.total_blocks_created += 1;
    }

    pub(crate) fn sort_order(&mut self) {
        let blocks = &self.blocks;
        self.block_order
            .sort_by_key(|id| blocks.get(id).map_or(usize::MAX, |b| b.start_line));
    }
}
