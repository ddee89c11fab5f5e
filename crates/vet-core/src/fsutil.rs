//! Crash-safe file writes.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::VetResult;

/// Write `data` to `path` via a sibling temp file and a rename.
///
/// The temp file is synced before the rename, so a reader sees either the
/// previous contents or the new ones, never a partial write.
pub fn atomic_write(path: &Path, data: &[u8]) -> VetResult<()> {
    let tmp = temp_path(path);
    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_data()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// `state.blob` -> `state.blob.tmp`, keeping the original extension.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("blob"));
    name.push(".tmp");
    path.with_file_name(name)
}
