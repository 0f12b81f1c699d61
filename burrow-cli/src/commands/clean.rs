//! Clean command - Discard cached clones that nobody is using

use std::sync::Arc;

use burrow_core::{
    CachingLeaseManager, Config, LeaseDirectoryProvider, LeaseOptions, MetricsRegistry, RepoKey,
    ShutdownRegistry,
};
use clap::Args;

/// Arguments for the clean command
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Only clean this repository (owner/repo)
    #[arg(short, long)]
    pub repo: Option<String>,
}

/// What a clean run did
#[derive(Debug, Default, PartialEq, Eq)]
struct CleanSummary {
    cleaned: usize,
    skipped: usize,
    failed: usize,
}

impl CleanArgs {
    /// Execute the clean command
    pub async fn execute(
        &self,
        verbose: bool,
        config: &Config,
        shutdown: Arc<ShutdownRegistry>,
    ) -> anyhow::Result<()> {
        let base_dir = config.base_dir()?;
        if !base_dir.exists() {
            println!("No clones cached.");
            return Ok(());
        }

        // Leasing through the manager means in-use clones are never touched
        let manager = config.lease_manager(Arc::new(MetricsRegistry::new()), shutdown)?;

        let keys = match &self.repo {
            Some(repo) => vec![RepoKey::parse(repo)?],
            None => manager.stable().cached_keys().await?,
        };

        let summary = clean_keys(&manager, &keys, verbose).await;

        println!();
        println!(
            "Cleaned {} clone(s), skipped {} in use.",
            summary.cleaned, summary.skipped
        );

        if summary.failed > 0 {
            anyhow::bail!("{} clone(s) could not be cleaned", summary.failed);
        }
        Ok(())
    }
}

/// Empty every idle clone in `keys`; one failure does not stop the rest
async fn clean_keys(
    manager: &CachingLeaseManager,
    keys: &[RepoKey],
    verbose: bool,
) -> CleanSummary {
    let opts = LeaseOptions::default();
    let mut summary = CleanSummary::default();

    for key in keys {
        let lease = match manager.provide(key, "main", &opts).await {
            Ok(lease) => lease,
            Err(e) => {
                summary.failed += 1;
                eprintln!("{}: failed to lease: {}", key, e);
                continue;
            }
        };

        if lease.is_transient() {
            summary.skipped += 1;
            println!("{}: in use, skipped", key);
            if let Err(e) = lease.release().await {
                tracing::warn!("Failed to release fallback lease for {}: {}", key, e);
            }
            continue;
        }

        if verbose {
            println!("Discarding {}", lease.path().display());
        }
        match lease.invalidate().await {
            Ok(()) => {
                summary.cleaned += 1;
                println!("{}: cleaned", key);
            }
            Err(e) => {
                summary.failed += 1;
                eprintln!("{}: failed to clean: {}", key, e);
            }
        }
    }

    summary
}
