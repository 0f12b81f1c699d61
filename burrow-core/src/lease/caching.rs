//! Lease manager that reuses stable clones when it can and isolates when it can't

use async_trait::async_trait;

use super::lock::LockOutcome;
use super::{
    DirectoryLease, LeaseDirectoryProvider, LeaseOptions, RepoKey, StableDirectoryProvider,
    TransientDirectoryProvider,
};
use crate::metrics::SharedMetricsRegistry;
use crate::Result;

/// Hands out the stable directory for a repository to one lease at a time
///
/// A request first tries to lock the stable directory. The winner gets the
/// stable directory (counted as a reuse); anyone who finds it locked gets a
/// private transient directory instead (counted as a fallback). There is no
/// waiting and no ordering between contenders.
///
/// The stable directory is only inspected or reset after its lock is held,
/// so a lease never sees another lease's clone being replaced underneath it.
#[derive(Debug)]
pub struct CachingLeaseManager {
    stable: StableDirectoryProvider,
    transient: TransientDirectoryProvider,
    metrics: SharedMetricsRegistry,
}

impl CachingLeaseManager {
    /// Compose the providers and the registry that records their use
    pub fn new(
        stable: StableDirectoryProvider,
        transient: TransientDirectoryProvider,
        metrics: SharedMetricsRegistry,
    ) -> Self {
        Self {
            stable,
            transient,
            metrics,
        }
    }

    /// Registry receiving reuse and fallback counts
    pub fn metrics(&self) -> &SharedMetricsRegistry {
        &self.metrics
    }

    /// Underlying stable provider
    pub fn stable(&self) -> &StableDirectoryProvider {
        &self.stable
    }
}

#[async_trait]
impl LeaseDirectoryProvider for CachingLeaseManager {
    async fn provide(
        &self,
        key: &RepoKey,
        branch: &str,
        opts: &LeaseOptions,
    ) -> Result<DirectoryLease> {
        let candidate = self.stable.prepare(key).await?;

        match self.stable.lock(key).await {
            LockOutcome::Acquired(held) => {
                let lease = match self.stable.provide(key, branch, opts).await {
                    Ok(lease) => lease,
                    Err(e) => {
                        if let Err(unlock) = held.release().await {
                            tracing::warn!("Failed to unlock {:?}: {}", candidate, unlock);
                        }
                        return Err(e);
                    }
                };

                self.metrics.record_reuse(key);
                let mut lease = lease.with_lock(held);
                lease.annotate("successfully locked");

                tracing::debug!(
                    repo = %key,
                    path = %lease.path().display(),
                    kind = ?lease.kind(),
                    "Leased stable clone directory"
                );
                Ok(lease)
            }
            LockOutcome::Contended(reason) => {
                self.metrics.record_fallback(key);
                tracing::info!(
                    repo = %key,
                    path = %candidate.display(),
                    "Stable clone directory is locked ({}); using transient fallback",
                    reason
                );

                let mut lease = self.transient.provide(key, branch, opts).await?;
                lease.annotate(format!(
                    "stable path {} was locked; using transient fallback",
                    candidate.display()
                ));
                Ok(lease)
            }
            LockOutcome::Fatal(e) => Err(e),
        }
    }
}
