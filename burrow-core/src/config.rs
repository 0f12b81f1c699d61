//! Configuration management for Burrow
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (BURROW_*)
//! 3. Config file (~/.config/burrow/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lease::{
    CachingLeaseManager, StableConfig, StableDirectoryProvider, TransientDirectoryProvider,
};
use crate::metrics::SharedMetricsRegistry;
use crate::shutdown::ShutdownRegistry;
use crate::{Error, Result};

/// Clone cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root of the `owner/repo` clone tree (defaults to `~/.cache/burrow/clones`)
    pub base_dir: Option<PathBuf>,

    /// Reuse existing clones
    pub reuse: bool,

    /// Remove the clone tree when the process exits
    pub clean_on_exit: bool,

    /// Where fallback clones go (defaults to the OS temp dir)
    pub transient_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            reuse: true,
            clean_on_exit: false,
            transient_dir: None,
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// How often the lease counters are logged
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Clone cache configuration
    pub cache: CacheConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Get the default clone cache directory
///
/// Returns `~/.cache/burrow/clones`
pub fn default_clones_dir() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .ok_or_else(|| Error::Config("Could not determine cache directory".to_string()))?;

    Ok(cache_dir.join("burrow").join("clones"))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/burrow/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("burrow").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - BURROW_BASE_DIR: Root of the clone tree
    /// - BURROW_REUSE: Reuse existing clones (true/false)
    /// - BURROW_CLEAN_ON_EXIT: Remove the clone tree on exit (true/false)
    /// - BURROW_TRANSIENT_DIR: Where fallback clones go
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(base_dir) = std::env::var("BURROW_BASE_DIR") {
            self.cache.base_dir = Some(PathBuf::from(base_dir));
        }

        if let Ok(reuse) = std::env::var("BURROW_REUSE") {
            self.cache.reuse = parse_bool("BURROW_REUSE", &reuse)?;
        }

        if let Ok(clean) = std::env::var("BURROW_CLEAN_ON_EXIT") {
            self.cache.clean_on_exit = parse_bool("BURROW_CLEAN_ON_EXIT", &clean)?;
        }

        if let Ok(transient_dir) = std::env::var("BURROW_TRANSIENT_DIR") {
            self.cache.transient_dir = Some(PathBuf::from(transient_dir));
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, base_dir: Option<PathBuf>, no_reuse: bool) -> Self {
        if let Some(dir) = base_dir {
            self.cache.base_dir = Some(dir);
        }

        if no_reuse {
            self.cache.reuse = false;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(base_dir: Option<PathBuf>, no_reuse: bool) -> Result<Self> {
        Ok(Self::load()?
            .with_env_overrides()?
            .with_cli_overrides(base_dir, no_reuse))
    }

    /// Clone tree root, falling back to the default location
    pub fn base_dir(&self) -> Result<PathBuf> {
        match &self.cache.base_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_clones_dir(),
        }
    }

    /// Settings for the stable directory provider
    pub fn stable_config(&self) -> Result<StableConfig> {
        Ok(StableConfig {
            reuse: self.cache.reuse,
            clean_on_process_exit: self.cache.clean_on_exit,
            base_dir: self.base_dir()?,
        })
    }

    /// Build a lease manager from this configuration
    pub fn lease_manager(
        &self,
        metrics: SharedMetricsRegistry,
        shutdown: Arc<ShutdownRegistry>,
    ) -> Result<CachingLeaseManager> {
        let stable = StableDirectoryProvider::new(self.stable_config()?, shutdown);
        let transient = match &self.cache.transient_dir {
            Some(dir) => TransientDirectoryProvider::with_root(dir),
            None => TransientDirectoryProvider::new(),
        };
        Ok(CachingLeaseManager::new(stable, transient, metrics))
    }
}
