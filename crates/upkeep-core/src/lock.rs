//! Exclusive run lock
//!
//! Only one update cycle may touch the package database at a time, whether
//! it was started by the schedule or by hand. The lock is an OS-level file
//! lock held for as long as the `RunLock` lives.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tracing::debug;

use crate::error::CoreError;

/// Held exclusive lock on the run lock file
#[derive(Debug)]
pub struct RunLock {
    /// The file handle; the lock is released when this is dropped
    _file: File,
    path: PathBuf,
}

impl RunLock {
    /// Try to take the lock without waiting
    ///
    /// # Errors
    /// Returns `CoreError::AlreadyRunning` if another process holds the lock,
    /// `CoreError::Lock` if the lock file cannot be opened
    pub fn acquire(path: &Path) -> Result<Self, CoreError> {
        let lock_err = |e: std::io::Error| CoreError::Lock {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(lock_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(lock_err)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(true) => {
                debug!(path = %path.display(), "run lock acquired");
                Ok(Self {
                    _file: file,
                    path: path.to_path_buf(),
                })
            }
            Ok(false) => Err(CoreError::AlreadyRunning(path.to_path_buf())),
            Err(e) => Err(lock_err(e)),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // The file stays on disk; unlinking it would let a waiter lock a stale inode
        debug!(path = %self.path.display(), "run lock released");
    }
}
