//! Line-level diffing between two full-text snapshots.
//!
//! Produces an ordered list of [`ChangeSpan`]s in the old text's line
//! numbering. Lines are compared whole; there is no intra-line diffing.
//!
//! Line splitting drops the final `\n`, so two texts that differ only in
//! whether they end with one diff as equal. [`trailing_newline_span`] reports
//! that case separately for callers that must not lose it.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default per-side line ceiling above which the LCS table is skipped.
pub const DEFAULT_MAX_DIFF_LINES: usize = 2000;

/// What kind of change a span (or block) represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Lines exist only in the new text.
    Add,
    /// Lines exist only in the old text.
    Delete,
    /// Old lines were replaced by new ones.
    Modify,
}

impl ChangeType {
    /// Classify a change by how many lines it removes and adds.
    pub fn from_counts(deleted: usize, added: usize) -> Self {
        match (deleted, added) {
            (0, _) => ChangeType::Add,
            (_, 0) => ChangeType::Delete,
            _ => ChangeType::Modify,
        }
    }
}

/// A contiguous run of changed lines.
///
/// `[start_line, end_line)` is half-open and 0-based in the old text.
/// `new_start_line` is where `added_lines` begin in the new text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSpan {
    pub start_line: usize,
    pub end_line: usize,
    pub new_start_line: usize,
    pub deleted_lines: Vec<String>,
    pub added_lines: Vec<String>,
    pub change_type: ChangeType,
}

impl ChangeSpan {
    fn empty_at(start_line: usize, new_start_line: usize) -> Self {
        Self {
            start_line,
            end_line: start_line,
            new_start_line,
            deleted_lines: Vec::new(),
            added_lines: Vec::new(),
            change_type: ChangeType::Add,
        }
    }

    /// One past the last line of this span in the new text.
    pub fn new_end_line(&self) -> usize {
        self.new_start_line + self.added_lines.len()
    }

    fn classify(&mut self) {
        self.change_type = ChangeType::from_counts(self.deleted_lines.len(), self.added_lines.len());
    }
}

/// Tuning knobs for [`diff_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    /// Split spans larger than this many lines (per side) into pieces.
    pub max_block_size: Option<usize>,
    /// Above this many changed lines on either side, skip the LCS and
    /// report the whole changed region as one span.
    pub max_lines: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            max_block_size: None,
            max_lines: DEFAULT_MAX_DIFF_LINES,
        }
    }
}

/// Split text into lines, dropping the empty artifact after a final `\n`.
///
/// Unlike `str::lines`, a trailing `\r` is kept so reverts are byte-exact.
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

/// Join lines back into content with `\n` separators and no trailing newline.
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rebuild full text from lines, ending with `\n` when `trailing_newline` is set.
pub fn render_lines<S: AsRef<str>>(lines: &[S], trailing_newline: bool) -> String {
    let mut out = join_lines(lines);
    if trailing_newline && !lines.is_empty() {
        out.push('\n');
    }
    out
}

/// Diff two texts with default options.
pub fn diff(old: &str, new: &str) -> Vec<ChangeSpan> {
    diff_with(old, new, &DiffOptions::default())
}

/// Diff two texts line by line.
///
/// Never fails: identical inputs (including two empty strings) yield no spans.
pub fn diff_with(old: &str, new: &str, options: &DiffOptions) -> Vec<ChangeSpan> {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);

    let prefix = old_lines
        .iter()
        .zip(new_lines.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old_lines.len().min(new_lines.len()) - prefix;
    let suffix = old_lines
        .iter()
        .rev()
        .zip(new_lines.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old_lines[prefix..old_lines.len() - suffix];
    let new_mid = &new_lines[prefix..new_lines.len() - suffix];

    if old_mid.is_empty() && new_mid.is_empty() {
        return Vec::new();
    }

    let raw = if old_mid.len() > options.max_lines || new_mid.len() > options.max_lines {
        debug!(
            old_lines = old_mid.len(),
            new_lines = new_mid.len(),
            ceiling = options.max_lines,
            "diff region over ceiling, reporting as a single span"
        );
        let mut span = ChangeSpan::empty_at(prefix, prefix);
        span.end_line = prefix + old_mid.len();
        span.deleted_lines = old_mid.iter().map(|l| l.to_string()).collect();
        span.added_lines = new_mid.iter().map(|l| l.to_string()).collect();
        span.classify();
        vec![span]
    } else {
        let table = lcs_table(old_mid, new_mid);
        let ops = lcs_backtrack(&table, old_mid, new_mid);
        collect_spans(&ops, old_mid, new_mid, prefix)
    };

    let merged = merge_adjacent(raw);
    match options.max_block_size {
        Some(limit) if limit > 0 => merged
            .into_iter()
            .flat_map(|span| split_oversized(span, limit))
            .collect(),
        _ => merged,
    }
}

/// A one-line span over the last line when `old` and `new` differ only in
/// their final newline. `None` when the texts are equal or differ elsewhere.
pub fn trailing_newline_span(old: &str, new: &str) -> Option<ChangeSpan> {
    if old == new {
        return None;
    }
    let old_lines = split_lines(old);
    if old_lines != split_lines(new) {
        return None;
    }
    let last = old_lines.len().checked_sub(1)?;
    let mut span = ChangeSpan::empty_at(last, last);
    span.end_line = last + 1;
    span.deleted_lines = vec![old_lines[last].to_string()];
    span.added_lines = vec![old_lines[last].to_string()];
    span.classify();
    Some(span)
}

/// Compute the longest common subsequence table for two slices of lines.
pub(crate) fn lcs_table(old: &[&str], new: &[&str]) -> Vec<Vec<usize>> {
    let m = old.len();
    let n = new.len();
    let mut table = vec![vec![0usize; n + 1]; m + 1];

    for i in 1..=m {
        for j in 1..=n {
            if old[i - 1] == new[j - 1] {
                table[i][j] = table[i - 1][j - 1] + 1;
            } else {
                table[i][j] = table[i - 1][j].max(table[i][j - 1]);
            }
        }
    }

    table
}

/// Edit operation produced by LCS backtracking.
#[derive(Debug, PartialEq)]
pub(crate) enum EditOp {
    Equal,
    Insert(usize), // new_idx
    Delete(usize), // old_idx
}

/// Backtrack through the LCS table to produce a sequence of edit operations.
///
/// Within a changed run, deletions come before insertions.
pub(crate) fn lcs_backtrack(table: &[Vec<usize>], old: &[&str], new: &[&str]) -> Vec<EditOp> {
    let mut ops = Vec::new();
    let mut i = old.len();
    let mut j = new.len();

    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old[i - 1] == new[j - 1] {
            ops.push(EditOp::Equal);
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table[i][j - 1] >= table[i - 1][j]) {
            ops.push(EditOp::Insert(j - 1));
            j -= 1;
        } else {
            ops.push(EditOp::Delete(i - 1));
            i -= 1;
        }
    }

    ops.reverse();
    ops
}

/// Group edit ops into spans, offset by the trimmed common prefix.
///
/// A deletion that follows an insertion starts a new span; such touching
/// spans are folded together again by [`merge_adjacent`].
fn collect_spans(ops: &[EditOp], old: &[&str], new: &[&str], offset: usize) -> Vec<ChangeSpan> {
    let mut spans = Vec::new();
    let mut current: Option<ChangeSpan> = None;
    let mut old_pos = 0usize;
    let mut new_pos = 0usize;

    for op in ops {
        match op {
            EditOp::Equal => {
                if let Some(span) = current.take() {
                    spans.push(span);
                }
                old_pos += 1;
                new_pos += 1;
            }
            EditOp::Delete(oi) => {
                if current.as_ref().is_some_and(|s| !s.added_lines.is_empty()) {
                    spans.extend(current.take());
                }
                let span = current
                    .get_or_insert_with(|| ChangeSpan::empty_at(offset + old_pos, offset + new_pos));
                span.deleted_lines.push(old[*oi].to_string());
                old_pos += 1;
                span.end_line = offset + old_pos;
            }
            EditOp::Insert(ni) => {
                let span = current
                    .get_or_insert_with(|| ChangeSpan::empty_at(offset + old_pos, offset + new_pos));
                span.added_lines.push(new[*ni].to_string());
                new_pos += 1;
            }
        }
    }
    spans.extend(current);

    for span in &mut spans {
        span.classify();
    }
    spans
}

/// Merge spans whose old-text boundaries touch into one `modify` span.
pub fn merge_adjacent(spans: Vec<ChangeSpan>) -> Vec<ChangeSpan> {
    let mut merged: Vec<ChangeSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if last.end_line == span.start_line => {
                last.end_line = span.end_line;
                last.deleted_lines.extend(span.deleted_lines);
                last.added_lines.extend(span.added_lines);
                last.change_type = ChangeType::Modify;
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Split a span into pieces of at most `limit` lines per side.
///
/// Deleted and added lines are divided proportionally across the pieces
/// and keep their original order.
fn split_oversized(span: ChangeSpan, limit: usize) -> Vec<ChangeSpan> {
    let deleted = span.deleted_lines.len();
    let added = span.added_lines.len();
    let size = deleted.max(added);
    if size <= limit {
        return vec![span];
    }

    let pieces = size.div_ceil(limit);
    (0..pieces)
        .map(|k| {
            let (d_lo, d_hi) = (k * deleted / pieces, (k + 1) * deleted / pieces);
            let (a_lo, a_hi) = (k * added / pieces, (k + 1) * added / pieces);
            let mut piece = ChangeSpan::empty_at(span.start_line + d_lo, span.new_start_line + a_lo);
            piece.end_line = span.start_line + d_hi;
            piece.deleted_lines = span.deleted_lines[d_lo..d_hi].to_vec();
            piece.added_lines = span.added_lines[a_lo..a_hi].to_vec();
            piece.classify();
            piece
        })
        .collect()
}
