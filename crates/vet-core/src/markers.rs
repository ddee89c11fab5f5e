//! Conflict-marker encoding of blocks.
//!
//! A block travels as plain text like this:
//!
//! ```text
//! <<<<<<< Original [block-1a2b3c4d-L12-T1700000000000]
//! base lines
//! =======
//! current lines
//! >>>>>>> Claude's Change
//! ```
//!
//! The id suffix on the start marker is optional. Parsing is a line scanner
//! that never fails: malformed regions are reported, not raised.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::block::Block;
use crate::block_id;
use crate::diff::{join_lines, render_lines, split_lines, ChangeSpan, ChangeType};

pub const START_MARKER: &str = "<<<<<<< Original";
pub const SEPARATOR_MARKER: &str = "=======";
pub const END_MARKER: &str = ">>>>>>> Claude's Change";

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Where a block's three marker lines ended up in an encoded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPlacement {
    pub start_marker_line: usize,
    pub separator_line: usize,
    pub end_marker_line: usize,
}

/// A buffer with marker regions spliced in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMarkers {
    pub text: String,
    pub placements: BTreeMap<String, MarkerPlacement>,
}

/// Splice marker regions into `text`.
///
/// Each span's `[start_line, end_line)` names the lines of `text` the region
/// replaces; its deleted and added lines fill the two halves. Regions that
/// overlap an earlier one are skipped. Untouched lines are kept verbatim.
pub fn insert_markers(text: &str, regions: &[(ChangeSpan, String)]) -> EncodedMarkers {
    let lines = split_lines(text);
    let mut ordered: Vec<&(ChangeSpan, String)> = regions.iter().collect();
    ordered.sort_by_key(|(span, _)| span.start_line);

    let mut out: Vec<String> = Vec::with_capacity(lines.len() + regions.len() * 3);
    let mut placements = BTreeMap::new();
    let mut cursor = 0usize;

    for (span, id) in ordered {
        let start = span.start_line.min(lines.len());
        if start < cursor {
            warn!(block_id = %id, start_line = span.start_line, "skipping overlapping marker region");
            continue;
        }
        out.extend(lines[cursor..start].iter().map(|l| l.to_string()));

        let start_marker_line = out.len();
        out.push(format!("{START_MARKER} [{id}]"));
        out.extend(span.deleted_lines.iter().cloned());
        let separator_line = out.len();
        out.push(SEPARATOR_MARKER.to_string());
        out.extend(span.added_lines.iter().cloned());
        let end_marker_line = out.len();
        out.push(END_MARKER.to_string());

        placements.insert(
            id.clone(),
            MarkerPlacement {
                start_marker_line,
                separator_line,
                end_marker_line,
            },
        );
        cursor = span.end_line.clamp(start, lines.len());
    }
    out.extend(lines[cursor..].iter().map(|l| l.to_string()));

    EncodedMarkers {
        text: render_lines(&out, text.is_empty() || text.ends_with('\n')),
        placements,
    }
}

/// Encode blocks against the current document text.
///
/// Each block's `[separator_line, end_line)` holds its post-image in `text`;
/// the region is replaced by markers carrying both images.
pub fn encode_blocks(text: &str, blocks: &[Block]) -> EncodedMarkers {
    let regions: Vec<(ChangeSpan, String)> = blocks
        .iter()
        .map(|block| {
            let span = ChangeSpan {
                start_line: block.separator_line,
                end_line: block.end_line,
                new_start_line: block.separator_line,
                deleted_lines: block.base_lines().into_iter().map(String::from).collect(),
                added_lines: block.current_lines().into_iter().map(String::from).collect(),
                change_type: block.change_type,
            };
            (span, block.id.clone())
        })
        .collect();
    insert_markers(text, &regions)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Why a marker region could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParseIssue {
    MissingSeparator,
    MissingEndMarker,
}

impl ParseIssue {
    pub fn reason(self) -> &'static str {
        match self {
            ParseIssue::MissingSeparator => "missing separator",
            ParseIssue::MissingEndMarker => "missing end marker",
        }
    }
}

/// One marker region found in a buffer, valid or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedBlock {
    /// The id from the start marker, or a `block-unknown-<line>` placeholder.
    pub id: String,
    pub has_explicit_id: bool,
    pub start_line: usize,
    pub separator_line: Option<usize>,
    pub end_line: Option<usize>,
    /// Base lines with leading and trailing blank lines trimmed.
    pub deleted_lines: Vec<String>,
    /// Current lines with leading and trailing blank lines trimmed.
    pub added_lines: Vec<String>,
    pub issue: Option<ParseIssue>,
}

impl ParsedBlock {
    pub fn is_valid(&self) -> bool {
        self.issue.is_none()
    }

    /// True when neither half has any content.
    pub fn is_empty(&self) -> bool {
        self.deleted_lines.is_empty() && self.added_lines.is_empty()
    }

    pub fn base_content(&self) -> String {
        join_lines(&self.deleted_lines)
    }

    pub fn current_content(&self) -> String {
        join_lines(&self.added_lines)
    }

    pub fn change_type(&self) -> ChangeType {
        ChangeType::from_counts(self.deleted_lines.len(), self.added_lines.len())
    }
}

/// Everything a parse found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMarkers {
    pub blocks: Vec<ParsedBlock>,
    pub valid_count: usize,
    pub invalid_count: usize,
}

impl ParsedMarkers {
    pub fn valid_blocks(&self) -> impl Iterator<Item = &ParsedBlock> {
        self.blocks.iter().filter(|b| b.is_valid())
    }

    pub fn has_markers(&self) -> bool {
        !self.blocks.is_empty()
    }
}

/// Scan a buffer for marker regions.
///
/// Every start marker opens a candidate region; scanning resumes on the line
/// after it, so a start marker inside another region is reported too. The
/// outer region's separator and end marker are looked up past any complete
/// inner region, so a nested region lies strictly inside its parent. When
/// that lookup fails the first matching marker line is used instead.
pub fn parse_markers(text: &str) -> ParsedMarkers {
    let lines = split_lines(text);
    let mut parsed = ParsedMarkers::default();

    for (start, line) in lines.iter().enumerate() {
        let Some(explicit_id) = start_marker_id(line) else {
            continue;
        };
        let has_explicit_id = explicit_id.is_some();
        let id = explicit_id.unwrap_or_else(|| block_id::placeholder(start));

        let separator = find_outer(&lines, start + 1, SEPARATOR_MARKER)
            .or_else(|| find_line(&lines, start + 1, SEPARATOR_MARKER));
        let end = separator.and_then(|sep| {
            find_outer(&lines, sep + 1, END_MARKER).or_else(|| find_line(&lines, sep + 1, END_MARKER))
        });
        let issue = match (separator, end) {
            (None, _) => Some(ParseIssue::MissingSeparator),
            (Some(_), None) => Some(ParseIssue::MissingEndMarker),
            _ => None,
        };

        let (deleted_lines, added_lines) = match (separator, end) {
            (Some(sep), Some(end)) => (
                trim_blank_edges(&lines[start + 1..sep]),
                trim_blank_edges(&lines[sep + 1..end]),
            ),
            _ => (Vec::new(), Vec::new()),
        };

        match issue {
            Some(issue) => {
                debug!(line = start, block_id = %id, reason = issue.reason(), "invalid marker region");
                parsed.invalid_count += 1;
            }
            None => parsed.valid_count += 1,
        }

        parsed.blocks.push(ParsedBlock {
            id,
            has_explicit_id,
            start_line: start,
            separator_line: separator,
            end_line: end,
            deleted_lines,
            added_lines,
            issue,
        });
    }

    parsed
}

/// `Some(Some(id))` for `<<<<<<< Original [id]`, `Some(None)` for a bare
/// start marker, `None` for any other line.
fn start_marker_id(line: &str) -> Option<Option<String>> {
    let rest = strip_cr(line).strip_prefix(START_MARKER)?;
    if rest.is_empty() {
        return Some(None);
    }
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim();
    if rest.is_empty() {
        return Some(None);
    }
    let inner = rest.strip_prefix('[')?.strip_suffix(']')?;
    Some(Some(inner.trim().to_string()))
}

/// Find `marker` at nesting depth zero, stepping over inner regions.
fn find_outer(lines: &[&str], from: usize, marker: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, line) in lines.iter().enumerate().skip(from) {
        let line = strip_cr(line);
        if start_marker_id(line).is_some() {
            depth += 1;
        } else if depth > 0 && line == END_MARKER {
            depth -= 1;
        } else if depth == 0 && line == marker {
            return Some(i);
        }
    }
    None
}

fn find_line(lines: &[&str], from: usize, marker: &str) -> Option<usize> {
    (from..lines.len()).find(|&i| strip_cr(lines[i]) == marker)
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// Drop fully blank lines at either edge; interior blank lines are content.
fn trim_blank_edges(lines: &[&str]) -> Vec<String> {
    let is_blank = |l: &&str| l.trim().is_empty();
    let first = lines.iter().position(|l| !is_blank(l));
    let last = lines.iter().rposition(|l| !is_blank(l));
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].iter().map(|l| l.to_string()).collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Which half of each region to keep when stripping markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the base lines (reject everything).
    Base,
    /// Keep the current lines (accept everything).
    Current,
}

/// Remove marker scaffolding, keeping one half of every valid region.
///
/// Invalid regions and regions nested in or overlapping an earlier one are
/// left untouched.
pub fn resolve_markers(text: &str, parsed: &ParsedMarkers, resolution: Resolution) -> String {
    let lines = split_lines(text);
    let mut regions: Vec<(usize, usize, usize)> = parsed
        .valid_blocks()
        .filter_map(|b| Some((b.start_line, b.separator_line?, b.end_line?)))
        .filter(|&(_, _, end)| end < lines.len())
        .collect();
    regions.sort_unstable();

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut cursor = 0usize;
    for (start, sep, end) in regions {
        if start < cursor {
            continue;
        }
        out.extend_from_slice(&lines[cursor..start]);
        match resolution {
            Resolution::Base => out.extend_from_slice(&lines[start + 1..sep]),
            Resolution::Current => out.extend_from_slice(&lines[sep + 1..end]),
        }
        cursor = end + 1;
    }
    out.extend_from_slice(&lines[cursor.min(lines.len())..]);

    render_lines(&out, text.ends_with('\n'))
}

/// The buffer with every conflict resolved to the AI's version.
pub fn extract_clean_content(text: &str, parsed: &ParsedMarkers) -> String {
    resolve_markers(text, parsed, Resolution::Current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;

    const ID_A: &str = "block-0badcafe-L1-T1700000000000";
    const ID_B: &str = "block-0badcafe-L4-T1700000000001";

    fn spans_with_ids(old: &str, new: &str) -> Vec<(ChangeSpan, String)> {
        diff(old, new)
            .into_iter()
            .enumerate()
            .map(|(i, span)| (span, format!("block-0badcafe-L{i}-T1")))
            .collect()
    }

    #[test]
    fn test_insert_single_region() {
        let regions = spans_with_ids("a\nb\nc\n", "a\nB\nc\n");
        let encoded = insert_markers("a\nb\nc\n", &regions);
        let expected = format!(
            "a\n{START_MARKER} [block-0badcafe-L0-T1]\nb\n{SEPARATOR_MARKER}\nB\n{END_MARKER}\nc\n"
        );
        assert_eq!(encoded.text, expected);

        let placement = encoded.placements["block-0badcafe-L0-T1"];
        assert_eq!(placement.start_marker_line, 1);
        assert_eq!(placement.separator_line, 3);
        assert_eq!(placement.end_marker_line, 5);
    }

    #[test]
    fn test_placements_account_for_earlier_regions() {
        let old = "1\n2\n3\n4\n5\n";
        let new = "1\nTWO\n3\n4\nFIVE\nSIX\n";
        let regions = spans_with_ids(old, new);
        assert_eq!(regions.len(), 2);

        let encoded = insert_markers(old, &regions);
        let lines = split_lines(&encoded.text);
        for placement in encoded.placements.values() {
            assert!(lines[placement.start_marker_line].starts_with(START_MARKER));
            assert_eq!(lines[placement.separator_line], SEPARATOR_MARKER);
            assert_eq!(lines[placement.end_marker_line], END_MARKER);
        }
        let second = encoded.placements["block-0badcafe-L1-T1"];
        assert_eq!(second.start_marker_line, 8);
    }

    #[test]
    fn test_round_trip() {
        let old = "fn main() {\n    println!(\"a\");\n}\n\nfn helper() {}\n";
        let new = "fn main() {\n    println!(\"b\");\n\n    run();\n}\n\nfn helper() {}\n";
        let regions = spans_with_ids(old, new);
        let encoded = insert_markers(old, &regions);
        let parsed = parse_markers(&encoded.text);

        assert_eq!(parsed.valid_count, regions.len());
        assert_eq!(parsed.invalid_count, 0);
        for ((span, id), block) in regions.iter().zip(&parsed.blocks) {
            assert_eq!(&block.id, id);
            assert!(block.has_explicit_id);
            assert_eq!(block.base_content(), join_lines(&span.deleted_lines));
            assert_eq!(block.current_content(), join_lines(&span.added_lines));
        }
        assert_eq!(extract_clean_content(&encoded.text, &parsed), new);
        assert_eq!(resolve_markers(&encoded.text, &parsed, Resolution::Base), old);
    }

    #[test]
    fn test_missing_separator() {
        let text = format!("{START_MARKER} [{ID_A}]\nold\nnew\n{END_MARKER}\n");
        let parsed = parse_markers(&text);
        assert_eq!(parsed.invalid_count, 1);
        assert_eq!(parsed.blocks[0].issue, Some(ParseIssue::MissingSeparator));
        assert_eq!(parsed.blocks[0].issue.unwrap().reason(), "missing separator");
    }

    #[test]
    fn test_missing_end_marker() {
        let text = format!("{START_MARKER} [{ID_A}]\nold\n{SEPARATOR_MARKER}\nnew\n");
        let parsed = parse_markers(&text);
        assert_eq!(parsed.invalid_count, 1);
        assert_eq!(parsed.blocks[0].issue, Some(ParseIssue::MissingEndMarker));
        assert_eq!(parsed.blocks[0].separator_line, Some(2));
        assert!(parsed.blocks[0].end_line.is_none());
    }

    #[test]
    fn test_missing_id_gets_placeholder() {
        let text = format!("keep\n{START_MARKER}\nold\n{SEPARATOR_MARKER}\nnew\n{END_MARKER}\n");
        let parsed = parse_markers(&text);
        assert_eq!(parsed.valid_count, 1);
        assert_eq!(parsed.blocks[0].id, "block-unknown-1");
        assert!(!parsed.blocks[0].has_explicit_id);
    }

    #[test]
    fn test_blank_edges_trimmed_interior_kept() {
        let text = format!(
            "{START_MARKER} [{ID_A}]\n\nold1\n\nold2\n  \n{SEPARATOR_MARKER}\n\n\nnew\n{END_MARKER}\n"
        );
        let parsed = parse_markers(&text);
        let block = &parsed.blocks[0];
        assert_eq!(block.deleted_lines, vec!["old1", "", "old2"]);
        assert_eq!(block.added_lines, vec!["new"]);
    }

    #[test]
    fn test_crlf_markers() {
        let text = format!(
            "{START_MARKER} [{ID_A}]\r\nold\r\n{SEPARATOR_MARKER}\r\nnew\r\n{END_MARKER}\r\n"
        );
        let parsed = parse_markers(&text);
        assert_eq!(parsed.valid_count, 1);
        assert_eq!(parsed.blocks[0].id, ID_A);
    }

    #[test]
    fn test_lookalike_lines_are_not_markers() {
        let text = "<<<<<<< Originality\n<<<<<<< HEAD\n=======\n>>>>>>> branch\n";
        let parsed = parse_markers(text);
        assert!(!parsed.has_markers());
    }

    #[test]
    fn test_multiple_regions_and_clean_content() {
        let text = format!(
            "top\n{START_MARKER} [{ID_A}]\nx\n{SEPARATOR_MARKER}\nX\n{END_MARKER}\nmid\n\
             {START_MARKER} [{ID_B}]\n{SEPARATOR_MARKER}\nnew line\n{END_MARKER}\nbottom"
        );
        let parsed = parse_markers(&text);
        assert_eq!(parsed.valid_count, 2);
        assert_eq!(parsed.blocks[1].change_type(), ChangeType::Add);
        assert_eq!(extract_clean_content(&text, &parsed), "top\nX\nmid\nnew line\nbottom");
        assert_eq!(
            resolve_markers(&text, &parsed, Resolution::Base),
            "top\nx\nmid\nbottom"
        );
    }

    #[test]
    fn test_nested_region_inside_parent() {
        let text = format!(
            "{START_MARKER} [{ID_A}]\nx\n{START_MARKER} [{ID_B}]\ny\n{SEPARATOR_MARKER}\nY\n{END_MARKER}\n\
             {SEPARATOR_MARKER}\nX\n{END_MARKER}\n"
        );
        let parsed = parse_markers(&text);
        assert_eq!(parsed.valid_count, 2);

        let outer = &parsed.blocks[0];
        assert_eq!((outer.separator_line, outer.end_line), (Some(7), Some(9)));
        let inner = &parsed.blocks[1];
        assert_eq!((inner.start_line, inner.separator_line, inner.end_line), (2, Some(4), Some(6)));

        // The outer region wins; the nested one is skipped.
        assert_eq!(extract_clean_content(&text, &parsed), "X\n");
    }

    #[test]
    fn test_invalid_region_left_verbatim_by_resolution() {
        let text = format!("a\n{START_MARKER} [{ID_A}]\nb\n");
        let parsed = parse_markers(&text);
        assert_eq!(extract_clean_content(&text, &parsed), text);
    }

    #[test]
    fn test_overlapping_insert_regions_skipped() {
        let mut first = diff("a\nb\nc\n", "a\nB\nc\n").remove(0);
        first.end_line = 3;
        let second = first.clone();
        let encoded = insert_markers(
            "a\nb\nc\n",
            &[(first, ID_A.to_string()), (second, ID_B.to_string())],
        );
        assert_eq!(encoded.placements.len(), 1);
    }
}
