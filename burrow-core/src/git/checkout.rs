//! Leasing a directory and bringing a clone into it in one step

use super::clone::{populate, RepoUrl};
use super::repo::is_usable_clone;
use crate::lease::{DirectoryLease, LeaseDirectoryProvider, LeaseKind, LeaseOptions};
use crate::{Error, Result};

/// Lease a directory for `url` and leave `branch` checked out in it
///
/// A reused directory that turns out not to be a clone of `url` is
/// invalidated and leased again, which yields an empty directory. If cloning
/// or refreshing fails the lease is given up (invalidated when stable,
/// released when transient) and the git error is returned.
///
/// The returned lease must still be released or invalidated by the caller.
pub async fn checkout(
    provider: &dyn LeaseDirectoryProvider,
    url: &RepoUrl,
    branch: &str,
    opts: &LeaseOptions,
) -> Result<DirectoryLease> {
    let key = url.key();
    let mut lease = provider.provide(key, branch, opts).await?;

    if lease.kind() == LeaseKind::AlreadyPopulated && !usable(&lease, url).await? {
        tracing::warn!(
            repo = %key,
            path = %lease.path().display(),
            "Cached clone is unusable; recreating"
        );
        lease.invalidate().await?;
        lease = provider.provide(key, branch, opts).await?;
        lease.annotate("previous clone was unusable and got invalidated");
    }

    if let Err(e) = populate(&lease, url, branch, opts).await {
        abandon(lease).await;
        return Err(e);
    }

    Ok(lease)
}

async fn usable(lease: &DirectoryLease, url: &RepoUrl) -> Result<bool> {
    let path = lease.path().to_path_buf();
    let clone_url = url.clone_url.clone();
    tokio::task::spawn_blocking(move || is_usable_clone(&path, &clone_url))
        .await
        .map_err(|e| Error::Other(format!("Clone check task failed: {}", e)))
}

async fn abandon(lease: DirectoryLease) {
    let path = lease.path().to_path_buf();
    let outcome = if lease.is_transient() {
        lease.release().await
    } else {
        lease.invalidate().await
    };
    if let Err(e) = outcome {
        tracing::warn!("Failed to give up lease on {:?}: {}", path, e);
    }
}
