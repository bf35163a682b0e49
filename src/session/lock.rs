//! session::lock
//!
//! Exclusive working-set lock.
//!
//! Readers never need a lock: they resolve a snapshot hash and read an
//! immutable snapshot. Writers serialize on an OS-level file lock so
//! only one process mutates a session's working set at a time.
//!
//! # Invariants
//!
//! - The lock is held for the duration of a mutating operation
//! - The lock is released on drop (RAII), even on panic
//! - Acquisition is non-blocking and fails fast when contended

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Errors from working-set locking.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("working set is locked by another process")]
    AlreadyLocked,

    /// Failed to create the lock file or its directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// An exclusive lock on a session's working set.
///
/// Released automatically when dropped.
#[derive(Debug)]
pub struct WorkingSetLock {
    path: PathBuf,
    /// When this is Some, we hold the lock.
    file: Option<File>,
}

impl WorkingSetLock {
    /// Attempt to acquire the lock at `<dir>/lock`.
    ///
    /// Non-blocking: if another process holds the lock this returns
    /// `AlreadyLocked` immediately.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if another process holds the lock
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be acquired
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        fs::create_dir_all(dir).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let path = dir.join("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::AlreadyLocked),
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Try to acquire, converting `AlreadyLocked` to `None`.
    pub fn try_acquire(dir: &Path) -> Result<Option<Self>, LockError> {
        match Self::acquire(dir) {
            Ok(lock) => Ok(Some(lock)),
            Err(LockError::AlreadyLocked) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether this guard still holds the lock.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock before the guard goes out of scope.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            file.unlock()
                .map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for WorkingSetLock {
    fn drop(&mut self) {
        // best-effort on drop
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
