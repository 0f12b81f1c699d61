//! Burrow CLI - Lease cached git clones for concurrent automation
//!
//! Checks out repositories into reusable clone directories, falling back to
//! throwaway directories when a cached clone is already in use.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use burrow_core::{Config, ShutdownRegistry};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{CheckoutArgs, CleanArgs, ListArgs};

/// Burrow: cached git clones leased to concurrent tasks
#[derive(Parser, Debug)]
#[command(name = "burrow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Root of the clone cache (overrides config and env)
    #[arg(long, global = true, env = "BURROW_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Never reuse cached clones
    #[arg(long, global = true)]
    no_reuse: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Lease clone directories and check repositories out into them
    #[command(visible_alias = "co")]
    Checkout(CheckoutArgs),

    /// List cached clones
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Discard cached clones that are not in use
    Clean(CleanArgs),

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    // Load configuration with overrides
    let config = Config::load_with_overrides(cli.base_dir.clone(), cli.no_reuse)?;

    if cli.verbose {
        tracing::info!(
            base_dir = ?config.cache.base_dir,
            reuse = config.cache.reuse,
            clean_on_exit = config.cache.clean_on_exit,
            "Configuration loaded"
        );
    }

    let shutdown = Arc::new(ShutdownRegistry::new());

    let outcome = match cli.command {
        Some(Commands::Version) => {
            println!("burrow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Checkout(args)) => args.execute(cli.verbose, &config, shutdown.clone()).await,
        Some(Commands::List(args)) => args.execute(cli.verbose, &config).await,
        Some(Commands::Clean(args)) => args.execute(cli.verbose, &config, shutdown.clone()).await,
        Some(Commands::Config) => {
            print_config(&config);
            Ok(())
        }
        None => {
            println!("Burrow - cached git clones for concurrent automation");
            println!();
            println!("Use --help for usage information");
            Ok(())
        }
    };

    // Teardown runs whether or not the command succeeded
    let failures = shutdown.run().await;
    if failures > 0 {
        tracing::warn!("{} teardown action(s) failed", failures);
    }

    outcome
}

fn print_config(config: &Config) {
    println!("Burrow Configuration");
    println!("====================");
    println!();
    println!("Cache Settings:");
    match config.base_dir() {
        Ok(dir) => println!("  base_dir: {}", dir.display()),
        Err(e) => println!("  base_dir: (unavailable: {})", e),
    }
    println!("  reuse: {}", config.cache.reuse);
    println!("  clean_on_exit: {}", config.cache.clean_on_exit);
    println!(
        "  transient_dir: {}",
        config
            .cache
            .transient_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(system temp)".to_string())
    );
    println!();
    println!("Metrics Settings:");
    println!(
        "  report_interval: {}s",
        config.metrics.report_interval.as_secs()
    );
    println!();
    if let Some(path) = Config::default_config_path() {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
}
