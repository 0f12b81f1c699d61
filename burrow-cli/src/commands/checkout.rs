//! Checkout command - Lease clone directories and populate them

use std::sync::Arc;

use burrow_core::{
    git, spawn_reporter, CachingLeaseManager, Config, LeaseKind, LeaseOptions, MetricsRegistry,
    RepoUrl, ShutdownRegistry,
};
use clap::Args;
use tokio::task::JoinSet;

/// Arguments for the checkout command
#[derive(Args, Debug)]
pub struct CheckoutArgs {
    /// Repositories to check out (owner/repo or clone URL)
    #[arg(required = true)]
    pub repos: Vec<String>,

    /// Branch to check out
    #[arg(short, long, default_value = "main")]
    pub branch: String,

    /// Concurrent checkouts per repository
    #[arg(short = 'n', long, default_value = "1")]
    pub parallel: usize,

    /// Keep fallback directories after the run
    #[arg(long)]
    pub keep: bool,

    /// Clone depth
    #[arg(long)]
    pub depth: Option<u32>,

    /// Always clone full history
    #[arg(long)]
    pub always_deep: bool,

    /// Fetch all branches, not just the requested one
    #[arg(long)]
    pub no_single_branch: bool,

    /// Leave HEAD detached at the branch tip
    #[arg(long)]
    pub detach: bool,
}

/// What one checkout produced, for the report
struct Outcome {
    repo: String,
    path: String,
    kind: LeaseKind,
    transient: bool,
    provenance: String,
}

impl CheckoutArgs {
    fn lease_options(&self) -> LeaseOptions {
        LeaseOptions {
            keep: self.keep,
            always_deep: self.always_deep,
            no_single_branch: self.no_single_branch,
            depth: self.depth,
            detach_head: self.detach,
        }
    }

    /// Execute the checkout command
    pub async fn execute(
        &self,
        verbose: bool,
        config: &Config,
        shutdown: Arc<ShutdownRegistry>,
    ) -> anyhow::Result<()> {
        let urls = self
            .repos
            .iter()
            .map(|r| RepoUrl::parse(r))
            .collect::<Result<Vec<_>, _>>()?;

        let metrics = Arc::new(MetricsRegistry::new());
        let manager = Arc::new(config.lease_manager(metrics.clone(), shutdown)?);
        let reporter = spawn_reporter(metrics.clone(), config.metrics.report_interval);

        if verbose {
            tracing::info!(
                repos = urls.len(),
                parallel = self.parallel,
                branch = %self.branch,
                "Starting checkouts"
            );
        }

        let opts = self.lease_options();
        let mut tasks = JoinSet::new();
        for url in urls {
            for _ in 0..self.parallel.max(1) {
                let manager = manager.clone();
                let url = url.clone();
                let branch = self.branch.clone();
                let opts = opts.clone();
                tasks.spawn(async move { checkout_one(&manager, &url, &branch, &opts).await });
            }
        }

        let mut failures = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok(outcome) => {
                    println!("{}", outcome.repo);
                    println!("  Path:       {}", outcome.path);
                    println!(
                        "  Kind:       {}",
                        match outcome.kind {
                            LeaseKind::NeedsPopulation => "fresh clone",
                            LeaseKind::AlreadyPopulated => "reused clone",
                        }
                    );
                    println!("  Transient:  {}", outcome.transient);
                    if verbose {
                        println!("  Provenance: {}", outcome.provenance);
                    }
                }
                Err(e) => {
                    failures += 1;
                    eprintln!("Checkout failed: {}", e);
                }
            }
        }

        reporter.abort();

        println!();
        println!("Lease summary");
        println!("=============");
        println!("{}", metrics.summary());

        if failures > 0 {
            anyhow::bail!("{} checkout(s) failed", failures);
        }
        Ok(())
    }
}

async fn checkout_one(
    manager: &CachingLeaseManager,
    url: &RepoUrl,
    branch: &str,
    opts: &LeaseOptions,
) -> burrow_core::Result<Outcome> {
    let lease = git::checkout(manager, url, branch, opts).await?;

    let outcome = Outcome {
        repo: url.key().to_string(),
        path: lease.path().display().to_string(),
        kind: lease.kind(),
        transient: lease.is_transient(),
        provenance: lease.provenance(),
    };

    lease.release().await?;
    Ok(outcome)
}
