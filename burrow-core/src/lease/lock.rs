//! Advisory locking of stable clone directories
//!
//! The lock lives in a sentinel file chosen by the caller, never inside the
//! directory it guards, so it does not show up in the working copy and
//! survives the directory being discarded. Stable clones keep theirs under
//! `base/.burrow/locks` (see [`RepoKey::lock_file_under`]). Locking is
//! non-blocking: a held lock is reported as [`LockOutcome::Contended`]
//! straight away and the caller decides what to do instead of waiting.
//!
//! [`RepoKey::lock_file_under`]: super::RepoKey::lock_file_under

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{Error, Result};

/// Result of trying to lock a directory
#[derive(Debug)]
pub enum LockOutcome {
    /// Lock is ours until [`DirectoryLock::release`]
    Acquired(DirectoryLock),
    /// Someone else holds the lock
    Contended(io::Error),
    /// Locking is impossible (missing target, unreadable lock file, ...)
    Fatal(Error),
}

/// Held lock on a directory
#[derive(Debug)]
pub struct DirectoryLock {
    file: Option<File>,
    lock_file: PathBuf,
}

impl DirectoryLock {
    /// Sentinel file holding the lock
    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    /// Drop the lock
    pub async fn release(mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Err(Error::Other(format!(
                "Lock {} released twice",
                self.lock_file.display()
            )));
        };
        let lock_file = self.lock_file.clone();

        tokio::task::spawn_blocking(move || {
            FileExt::unlock(&file).map_err(|e| Error::fs("unlock", &lock_file, e))
        })
        .await
        .map_err(|e| Error::Other(format!("Unlock task failed: {}", e)))?
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if self.file.is_some() {
            // Closing the descriptor frees the OS lock anyway
            tracing::warn!("Lock {:?} dropped without release", self.lock_file);
        }
    }
}

/// Try to lock `target` through `lock_file` without waiting
///
/// The lock file and its parent directories are created if needed.
pub async fn acquire(target: &Path, lock_file: &Path) -> LockOutcome {
    let target = target.to_path_buf();
    let lock_file = lock_file.to_path_buf();
    match tokio::task::spawn_blocking(move || try_lock(&target, lock_file)).await {
        Ok(outcome) => outcome,
        Err(e) => LockOutcome::Fatal(Error::Other(format!("Lock task failed: {}", e))),
    }
}

fn try_lock(target: &Path, lock_file: PathBuf) -> LockOutcome {
    if let Some(parent) = lock_file.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return LockOutcome::Fatal(Error::fs("create lock directory", parent, e));
        }
    }

    let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_file)
    {
        Ok(file) => file,
        Err(e) => return LockOutcome::Fatal(Error::fs("open lock file", &lock_file, e)),
    };

    // Contention is checked before the target: a holder may be resetting it
    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {}
        Err(e) if is_contended(&e) => return LockOutcome::Contended(e),
        Err(e) => return LockOutcome::Fatal(Error::fs("lock", &lock_file, e)),
    }

    let missing = match std::fs::metadata(target) {
        Ok(meta) if meta.is_dir() => None,
        Ok(_) => Some(Error::Other(format!(
            "Cannot lock {}: not a directory",
            target.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Some(Error::MissingTarget(target.to_path_buf()))
        }
        Err(e) => Some(Error::fs("inspect", target, e)),
    };
    if let Some(err) = missing {
        if let Err(e) = FileExt::unlock(&file) {
            tracing::warn!("Failed to unlock {:?}: {}", lock_file, e);
        }
        return LockOutcome::Fatal(err);
    }

    tracing::debug!(lock_file = %lock_file.display(), "Acquired directory lock");
    LockOutcome::Acquired(DirectoryLock {
        file: Some(file),
        lock_file,
    })
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
