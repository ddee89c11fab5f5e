//! Canonical lookup keys for file paths.
//!
//! The same file reaches the engine through different spellings: an editor
//! buffer URI, a watcher event, a relative path from the agent. Every map in
//! the engine is keyed by a [`PathKey`] so they all land on one record.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Whether the platform's default filesystem compares names case-insensitively.
pub const CASE_INSENSITIVE_FS: bool = cfg!(any(windows, target_os = "macos"));

/// A normalized, absolute, `/`-separated path used as a map key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathKey(String);

impl PathKey {
    /// Normalize `path` using the platform's case sensitivity.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_case_folding(path, CASE_INSENSITIVE_FS)
    }

    /// Normalize `path`, lowercasing it when `fold_case` is set.
    pub fn with_case_folding(path: impl AsRef<Path>, fold_case: bool) -> Self {
        let raw = path.as_ref().to_string_lossy().replace('\\', "/");
        let absolute = if is_absolute(&raw) {
            raw
        } else {
            let cwd = std::env::current_dir().unwrap_or_default();
            format!("{}/{raw}", cwd.to_string_lossy().replace('\\', "/"))
        };

        let mut key = normalize(&absolute);
        if fold_case {
            key = key.to_lowercase();
        }
        PathKey(key)
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PathKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `/abs` or a drive-letter path such as `C:/abs`.
fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || drive_prefix(path).is_some()
}

fn drive_prefix(path: &str) -> Option<&str> {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        Some(&path[..2])
    } else {
        None
    }
}

/// Resolve `.` and `..` lexically and collapse repeated separators.
fn normalize(path: &str) -> String {
    let (prefix, rest) = match drive_prefix(path) {
        Some(drive) => (drive.to_uppercase(), &path[2..]),
        None => (String::new(), path),
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    format!("{prefix}/{}", parts.join("/"))
}
