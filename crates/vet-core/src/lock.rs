//! Advisory locking for the on-disk blob store.
//!
//! Uses `flock(2)`-style locks via `fs2`. The OS drops the lock when the
//! holding process dies, so there is no stale-lock cleanup.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{VetError, VetResult};

/// Lock file name inside a store directory.
pub const LOCK_FILE: &str = "store.lock";

/// An exclusive lock on a store directory, released on drop.
pub struct StoreLock {
    _file: File,
}

impl StoreLock {
    /// Acquire the store lock, polling until `timeout` expires.
    pub fn acquire(dir: &Path, timeout: Duration) -> VetResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;

        let start = Instant::now();
        let poll_interval = Duration::from_millis(10);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(StoreLock { _file: file }),
                Err(_) if start.elapsed() >= timeout => return Err(VetError::LockTimeout),
                Err(_) => std::thread::sleep(poll_interval),
            }
        }
    }
}
