//! Durable byte storage for state snapshots.
//!
//! The engine needs one thing from storage: put and get an opaque blob under
//! a logical key. [`FileBlobStore`] keeps one file per key in a directory;
//! [`MemoryBlobStore`] is for hosts with their own persistence and for tests.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{VetError, VetResult};
use crate::fsutil::atomic_write;
use crate::lock::StoreLock;

const BLOB_EXTENSION: &str = "blob";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Key/value byte storage.
pub trait BlobStore {
    /// Fetch the blob under `key`, or `None` if nothing was stored.
    fn get(&self, key: &str) -> VetResult<Option<Vec<u8>>>;

    /// Store `data` under `key`, replacing any previous blob.
    fn put(&mut self, key: &str, data: &[u8]) -> VetResult<()>;

    /// Delete the blob under `key`. Returns false if there was none.
    fn remove(&mut self, key: &str) -> VetResult<bool>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> VetResult<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn put(&mut self, key: &str, data: &[u8]) -> VetResult<()> {
        self.blobs.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> VetResult<bool> {
        Ok(self.blobs.remove(key).is_some())
    }
}

/// A directory of `<key>.blob` files.
///
/// Writes are atomic and serialized across processes by an advisory lock on
/// `store.lock` in the same directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
    lock_timeout: Duration,
}

impl FileBlobStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> VetResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, key: &str) -> VetResult<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(VetError::Other(format!("invalid blob key '{key}'")));
        }
        Ok(self.dir.join(format!("{key}.{BLOB_EXTENSION}")))
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> VetResult<Option<Vec<u8>>> {
        let path = self.blob_path(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&mut self, key: &str, data: &[u8]) -> VetResult<()> {
        let path = self.blob_path(key)?;
        let _lock = StoreLock::acquire(&self.dir, self.lock_timeout)?;
        atomic_write(&path, data)?;
        debug!(key, bytes = data.len(), "blob written");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> VetResult<bool> {
        let path = self.blob_path(key)?;
        let _lock = StoreLock::acquire(&self.dir, self.lock_timeout)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
