//! List command - Show cached clones and whether they are in use

use std::sync::Arc;

use burrow_core::git::ClonedRepo;
use burrow_core::{Config, LockOutcome, ShutdownRegistry, StableDirectoryProvider};
use clap::Args;

/// Arguments for the list command
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show repositories of this owner
    #[arg(short, long)]
    pub owner: Option<String>,
}

impl ListArgs {
    /// Execute the list command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let base_dir = config.base_dir()?;

        if !base_dir.exists() {
            println!("No clones cached.");
            return Ok(());
        }

        // Listing never provides a lease, so nothing is registered here
        let stable =
            StableDirectoryProvider::new(config.stable_config()?, Arc::new(ShutdownRegistry::new()));

        let mut found_any = false;

        for key in stable.cached_keys().await? {
            // Apply filter
            if let Some(filter) = &self.owner {
                if key.owner() != filter {
                    continue;
                }
            }

            found_any = true;
            let repo_dir = stable.candidate_path(&key);
            let state = match stable.lock(&key).await {
                LockOutcome::Acquired(held) => {
                    held.release().await?;
                    "idle"
                }
                LockOutcome::Contended(_) => "in use",
                LockOutcome::Fatal(e) => {
                    tracing::warn!("Cannot check {:?}: {}", repo_dir, e);
                    "unknown"
                }
            };

            println!("{} [{}]", key, state);

            if verbose {
                println!("  Path:   {}", repo_dir.display());
                match ClonedRepo::open(&repo_dir) {
                    Ok(repo) => {
                        let branch = repo.current_branch().ok().flatten();
                        println!("  Branch: {}", branch.as_deref().unwrap_or("(detached)"));
                        if let Some(url) = repo.origin_url() {
                            println!("  Origin: {}", url);
                        }
                    }
                    Err(_) => println!("  (empty or not a clone)"),
                }
            }
        }

        if !found_any {
            println!("No clones found.");
        }

        Ok(())
    }
}
