//! Structural checks over parsed conflict markers.
//!
//! Findings are data, not errors: a caller decides whether an invalid buffer
//! should block what it was about to do.

use std::collections::HashMap;

use serde::Serialize;

use crate::block_id;
use crate::markers::{parse_markers, ParseIssue, ParsedBlock, ParsedMarkers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    MissingSeparator,
    MissingEndMarker,
    InvalidBlockId,
    MissingBlockId,
    DuplicateBlockId,
    NestedBlock,
    EmptyBlock,
    OverlappingBlocks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub severity: Severity,
}

impl Finding {
    fn error(kind: FindingKind, message: String, block: &ParsedBlock) -> Self {
        Self::at(kind, message, block, Severity::Error)
    }

    fn warning(kind: FindingKind, message: String, block: &ParsedBlock) -> Self {
        Self::at(kind, message, block, Severity::Warning)
    }

    fn at(kind: FindingKind, message: String, block: &ParsedBlock, severity: Severity) -> Self {
        Self {
            kind,
            message,
            block_id: Some(block.id.clone()),
            line: Some(block.start_line),
            severity,
        }
    }
}

/// The result of validating a buffer (or a single block).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
    pub is_valid: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub block_count: usize,
}

impl ValidationReport {
    fn from_findings(findings: Vec<Finding>, block_count: usize) -> Self {
        let error_count = findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .count();
        let warning_count = findings.len() - error_count;
        Self {
            findings,
            is_valid: error_count == 0,
            error_count,
            warning_count,
            block_count,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Warning)
    }

    pub fn has(&self, kind: FindingKind) -> bool {
        self.findings.iter().any(|f| f.kind == kind)
    }
}

/// Parse and validate a buffer.
pub fn validate_markers(text: &str) -> ValidationReport {
    validate_parsed(&parse_markers(text))
}

/// Validate an already parsed buffer.
pub fn validate_parsed(parsed: &ParsedMarkers) -> ValidationReport {
    let mut findings = Vec::new();

    for block in &parsed.blocks {
        check_structure(block, &mut findings);
        check_id(block, &mut findings);
        if block.is_valid() && block.is_empty() {
            findings.push(Finding::warning(
                FindingKind::EmptyBlock,
                format!("block {} has no base or current content", block.id),
                block,
            ));
        }
    }

    check_duplicates(&parsed.blocks, &mut findings);
    check_layout(&parsed.blocks, &mut findings);

    ValidationReport::from_findings(findings, parsed.blocks.len())
}

/// Validate one block in isolation. An empty block is an error here.
pub fn validate_block(block: &ParsedBlock) -> ValidationReport {
    let mut findings = Vec::new();
    check_structure(block, &mut findings);
    check_id(block, &mut findings);
    if block.is_empty() {
        findings.push(Finding::error(
            FindingKind::EmptyBlock,
            format!("block {} has no base or current content", block.id),
            block,
        ));
    }
    ValidationReport::from_findings(findings, 1)
}

/// True only when the buffer holds at least one marker region and no errors.
pub fn quick_check(text: &str) -> bool {
    let report = validate_markers(text);
    report.is_valid && report.block_count > 0
}

fn check_structure(block: &ParsedBlock, findings: &mut Vec<Finding>) {
    let Some(issue) = block.issue else {
        return;
    };
    let kind = match issue {
        ParseIssue::MissingSeparator => FindingKind::MissingSeparator,
        ParseIssue::MissingEndMarker => FindingKind::MissingEndMarker,
    };
    findings.push(Finding::error(
        kind,
        format!("block {}: {}", block.id, issue.reason()),
        block,
    ));
}

fn check_id(block: &ParsedBlock, findings: &mut Vec<Finding>) {
    if !block.has_explicit_id || block_id::is_placeholder(&block.id) {
        findings.push(Finding::warning(
            FindingKind::MissingBlockId,
            format!("start marker on line {} carries no block id", block.start_line),
            block,
        ));
    } else if !block_id::is_well_formed(&block.id) {
        findings.push(Finding::error(
            FindingKind::InvalidBlockId,
            format!("malformed block id '{}'", block.id),
            block,
        ));
    }
}

fn check_duplicates(blocks: &[ParsedBlock], findings: &mut Vec<Finding>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for block in blocks.iter().filter(|b| b.has_explicit_id) {
        if let Some(first_line) = seen.get(block.id.as_str()) {
            findings.push(Finding::error(
                FindingKind::DuplicateBlockId,
                format!(
                    "block id '{}' on line {} already used on line {}",
                    block.id, block.start_line, first_line
                ),
                block,
            ));
        } else {
            seen.insert(&block.id, block.start_line);
        }
    }
}

/// Nesting and overlap between complete regions.
fn check_layout(blocks: &[ParsedBlock], findings: &mut Vec<Finding>) {
    let mut spans: Vec<(usize, usize, &ParsedBlock)> = blocks
        .iter()
        .filter_map(|b| Some((b.start_line, b.end_line?, b)))
        .collect();
    spans.sort_by_key(|&(start, end, _)| (start, end));

    for (i, &(a_start, a_end, outer)) in spans.iter().enumerate() {
        for &(b_start, b_end, inner) in &spans[i + 1..] {
            if b_start > a_end {
                break;
            }
            if a_start < b_start && b_end < a_end {
                findings.push(Finding::error(
                    FindingKind::NestedBlock,
                    format!(
                        "block {} (lines {b_start}-{b_end}) is nested inside block {} (lines {a_start}-{a_end})",
                        inner.id, outer.id
                    ),
                    inner,
                ));
            }
        }
    }

    for pair in spans.windows(2) {
        let (a_start, a_end, a) = pair[0];
        let (b_start, b_end, b) = pair[1];
        let nested = a_start < b_start && b_end < a_end;
        if a_end >= b_start && !nested {
            findings.push(Finding::error(
                FindingKind::OverlappingBlocks,
                format!(
                    "block {} ends on line {a_end} at or after block {} starts on line {b_start}",
                    a.id, b.id
                ),
                b,
            ));
        }
    }
}
