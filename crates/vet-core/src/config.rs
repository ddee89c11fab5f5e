//! Engine configuration.
//!
//! Stored as JSON. Every field has a default, so a missing file or a file
//! naming only some fields is valid.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::diff::{DiffOptions, DEFAULT_MAX_DIFF_LINES};
use crate::error::{VetError, VetResult};

/// Default lifetime of a "mark for incoming AI edit" arming.
pub const DEFAULT_ARMING_TIMEOUT_SECS: u64 = 30;

/// Default ceiling on a serialized state snapshot (10 MiB).
pub const DEFAULT_MAX_SNAPSHOT_BYTES: usize = 10 * 1024 * 1024;

/// Tunables for the review engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Seconds an armed file waits for its change notification.
    pub arming_timeout_secs: u64,
    /// Split diff spans larger than this many lines.
    pub max_block_size: Option<usize>,
    /// Per-side changed-line count above which diffing degrades to one span.
    pub max_diff_lines: usize,
    /// Snapshots larger than this are skipped rather than saved.
    pub max_snapshot_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arming_timeout_secs: DEFAULT_ARMING_TIMEOUT_SECS,
            max_block_size: None,
            max_diff_lines: DEFAULT_MAX_DIFF_LINES,
            max_snapshot_bytes: DEFAULT_MAX_SNAPSHOT_BYTES,
        }
    }
}

impl EngineConfig {
    /// Load the config from a JSON file, or return defaults if it is absent.
    pub fn load(path: &Path) -> VetResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> VetResult<()> {
        if self.max_block_size == Some(0) {
            return Err(VetError::InvalidConfig(
                "max_block_size must be at least 1".to_string(),
            ));
        }
        if self.max_diff_lines == 0 {
            return Err(VetError::InvalidConfig(
                "max_diff_lines must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn arming_timeout(&self) -> chrono::Duration {
        i64::try_from(self.arming_timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            max_block_size: self.max_block_size,
            max_lines: self.max_diff_lines,
        }
    }
}
