//! Block identifiers.
//!
//! Format: `block-<8 lowercase hex>-L<line>-T<epoch millis>`, where the hex
//! is the short hash of the file's [`PathKey`]. Marker regions that carry no
//! id are given a placeholder `block-unknown-<line>`.

use crate::hash::{short_hash, SHORT_HASH_LEN};
use crate::path_key::PathKey;

const ID_PREFIX: &str = "block-";
const PLACEHOLDER_PREFIX: &str = "block-unknown-";

/// The decoded components of a well-formed block id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIdParts {
    pub path_hash: String,
    pub anchor_line: u64,
    pub created_at_millis: u64,
}

/// Build the id for a block anchored at `anchor_line` of `key`.
pub fn generate(key: &PathKey, anchor_line: usize, created_at_millis: i64) -> String {
    format!(
        "{ID_PREFIX}{}-L{anchor_line}-T{}",
        short_hash(key.as_str()),
        created_at_millis.max(0)
    )
}

/// Like [`generate`], but bumps the timestamp until `taken` reports the id free.
pub fn generate_unique(
    key: &PathKey,
    anchor_line: usize,
    created_at_millis: i64,
    taken: impl Fn(&str) -> bool,
) -> String {
    let mut millis = created_at_millis.max(0);
    loop {
        let id = generate(key, anchor_line, millis);
        if !taken(&id) {
            return id;
        }
        millis += 1;
    }
}

/// Decode a block id, or `None` if it does not follow the format.
pub fn parse(id: &str) -> Option<BlockIdParts> {
    let rest = id.strip_prefix(ID_PREFIX)?;
    let (hash, rest) = rest.split_once("-L")?;
    let (line, millis) = rest.split_once("-T")?;

    let hash_ok = hash.len() == SHORT_HASH_LEN
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !hash_ok || !is_digits(line) || !is_digits(millis) {
        return None;
    }

    Some(BlockIdParts {
        path_hash: hash.to_string(),
        anchor_line: line.parse().ok()?,
        created_at_millis: millis.parse().ok()?,
    })
}

/// True if `id` follows the `block-<hash>-L<n>-T<n>` format.
pub fn is_well_formed(id: &str) -> bool {
    parse(id).is_some()
}

/// The id given to a marker region found at `line` without an explicit id.
pub fn placeholder(line: usize) -> String {
    format!("{PLACEHOLDER_PREFIX}{line}")
}

/// True if `id` was produced by [`placeholder`].
pub fn is_placeholder(id: &str) -> bool {
    id.strip_prefix(PLACEHOLDER_PREFIX).is_some_and(is_digits)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PathKey {
        PathKey::with_case_folding("/repo/src/main.rs", false)
    }

    #[test]
    fn test_generate_and_parse() {
        let id = generate(&key(), 12, 1_700_000_000_123);
        let parts = parse(&id).unwrap();
        assert_eq!(parts.path_hash, short_hash("/repo/src/main.rs"));
        assert_eq!(parts.anchor_line, 12);
        assert_eq!(parts.created_at_millis, 1_700_000_000_123);
        assert!(id.ends_with("-L12-T1700000000123"));
    }

    #[test]
    fn test_generate_unique_bumps_timestamp() {
        let first = generate(&key(), 3, 100);
        let second = generate_unique(&key(), 3, 100, |id| id == first);
        assert_ne!(first, second);
        assert!(second.ends_with("-L3-T101"));
    }

    #[test]
    fn test_rejects_malformed_ids() {
        assert!(!is_well_formed("block-ABCDEF12-L1-T1"));
        assert!(!is_well_formed("block-abc-L1-T1"));
        assert!(!is_well_formed("block-abcdef12-L-T1"));
        assert!(!is_well_formed("block-abcdef12-L1-Tx"));
        assert!(!is_well_formed("blk-abcdef12-L1-T1"));
        assert!(!is_well_formed("block-abcdef12-L1"));
        assert!(is_well_formed("block-abcdef12-L1-T1"));
    }

    #[test]
    fn test_placeholder() {
        let id = placeholder(7);
        assert_eq!(id, "block-unknown-7");
        assert!(is_placeholder(&id));
        assert!(!is_well_formed(&id));
        assert!(!is_placeholder("block-unknown-"));
        assert!(!is_placeholder("block-abcdef12-L1-T1"));
    }
}
