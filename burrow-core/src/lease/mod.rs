//! Clone directory leases
//!
//! A lease hands a caller a directory in which to keep a git working copy.
//! Providers decide where the directory lives and what releasing it means:
//!
//! - [`StableDirectoryProvider`] keeps one directory per `owner/repo` for reuse
//! - [`TransientDirectoryProvider`] allocates a throwaway temp directory
//! - [`CachingLeaseManager`] locks the stable directory and falls back to a
//!   transient one when another lease already holds it
//!
//! Every lease must be finished with exactly one call to
//! [`DirectoryLease::release`] or [`DirectoryLease::invalidate`]. Both consume
//! the lease. A lease that is dropped instead keeps its stable directory
//! unavailable until the underlying lock file descriptor is closed, and a
//! transient directory is never deleted.

mod caching;
mod key;
pub mod lock;
mod stable;
mod transient;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::Result;

pub use caching::CachingLeaseManager;
pub use key::{RepoKey, RESERVED_DIR};
pub use lock::{DirectoryLock, LockOutcome};
pub use stable::{StableConfig, StableDirectoryProvider};
pub use transient::TransientDirectoryProvider;

/// What the caller has to do with a leased directory before using it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseKind {
    /// Directory is empty; clone into it
    NeedsPopulation,
    /// Directory already holds a clone; fetch and clean it instead
    AlreadyPopulated,
}

/// Options carried with a lease request
///
/// Only `keep` is interpreted by the providers. The clone depth hints are
/// passed through for whoever populates the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseOptions {
    /// Keep a transient directory on disk after release
    pub keep: bool,
    /// Always make a full-history clone
    pub always_deep: bool,
    /// Fetch all branches instead of only the requested one
    pub no_single_branch: bool,
    /// Explicit clone depth
    pub depth: Option<u32>,
    /// Check out a detached HEAD instead of a local branch
    pub detach_head: bool,
}

/// What happens to the directory when the lease ends
#[derive(Debug)]
enum Backing {
    /// Long-lived directory; release keeps it, invalidate empties it by
    /// moving its contents into `scratch`
    Stable { scratch: PathBuf },
    /// Temp directory; release removes it unless kept
    Transient { keep: bool },
}

/// Handle to a leased directory
#[derive(Debug)]
pub struct DirectoryLease {
    path: PathBuf,
    kind: LeaseKind,
    transient: bool,
    provenance: Vec<String>,
    backing: Backing,
    lock: Option<DirectoryLock>,
}

impl DirectoryLease {
    pub(crate) fn stable(
        path: PathBuf,
        scratch: PathBuf,
        kind: LeaseKind,
        provenance: impl Into<String>,
    ) -> Self {
        Self {
            path,
            kind,
            transient: false,
            provenance: vec![provenance.into()],
            backing: Backing::Stable { scratch },
            lock: None,
        }
    }

    pub(crate) fn transient(path: PathBuf, keep: bool, provenance: impl Into<String>) -> Self {
        Self {
            path,
            kind: LeaseKind::NeedsPopulation,
            transient: true,
            provenance: vec![provenance.into()],
            backing: Backing::Transient { keep },
            lock: None,
        }
    }

    /// Attach the lock guarding this directory; it is released with the lease
    pub(crate) fn with_lock(mut self, lock: DirectoryLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Leased directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory must be cloned into or already holds a clone
    pub fn kind(&self) -> LeaseKind {
        self.kind
    }

    /// Whether the directory is short-lived
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Whether this lease holds the lock on a stable directory
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// How this lease came to be, oldest step first
    pub fn provenance(&self) -> String {
        self.provenance.join("; ")
    }

    /// Append a step to the provenance trail
    pub fn annotate(&mut self, note: impl Into<String>) {
        self.provenance.push(note.into());
    }

    /// Finish using the directory
    ///
    /// Unlocks first, then lets the backing provider clean up.
    pub async fn release(mut self) -> Result<()> {
        tracing::debug!(path = %self.path.display(), "Releasing directory lease");

        if let Some(lock) = self.lock.take() {
            lock.release().await?;
        }

        match self.backing {
            Backing::Stable { .. } => Ok(()),
            Backing::Transient { keep: true } => Ok(()),
            Backing::Transient { keep: false } => {
                if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
                    tracing::warn!(
                        "Failed to remove transient directory {:?}: {}",
                        self.path,
                        e
                    );
                }
                Ok(())
            }
        }
    }

    /// Discard the directory because its contents are unusable
    ///
    /// A stable directory is emptied before the lock is dropped, so no other
    /// lease can pick up a half-deleted clone, and the next lease for the
    /// same repository clones from scratch. The lock is released even when
    /// emptying fails; that error is returned.
    pub async fn invalidate(mut self) -> Result<()> {
        tracing::debug!(path = %self.path.display(), "Invalidating directory lease");

        let removed = match &self.backing {
            Backing::Stable { scratch } => stable::reset_directory(&self.path, scratch).await,
            Backing::Transient { .. } => Ok(()),
        };

        let unlocked = match self.lock.take() {
            Some(lock) => lock.release().await,
            None => Ok(()),
        };

        removed.and(unlocked)
    }
}

/// Something that hands out clone directories
#[async_trait]
pub trait LeaseDirectoryProvider: Send + Sync {
    /// Lease a directory for `key` at `branch`
    ///
    /// Returns a fully prepared lease or an error; never a partial lease.
    async fn provide(
        &self,
        key: &RepoKey,
        branch: &str,
        opts: &LeaseOptions,
    ) -> Result<DirectoryLease>;
}
