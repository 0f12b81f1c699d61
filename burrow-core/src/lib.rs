//! Burrow Core - Clone directory leasing for concurrent git automation
//!
//! Hands out directories backing local git clones to concurrent tasks,
//! reusing one cached clone per repository where possible and never letting
//! two tasks write into the same working copy at once.

pub mod config;
pub mod error;
pub mod git;
pub mod lease;
pub mod metrics;
pub mod shutdown;

pub use config::Config;
pub use error::{Error, Result};
pub use git::RepoUrl;
pub use lease::{
    CachingLeaseManager, DirectoryLease, DirectoryLock, LeaseDirectoryProvider, LeaseKind,
    LeaseOptions, LockOutcome, RepoKey, StableConfig, StableDirectoryProvider,
    TransientDirectoryProvider,
};
pub use metrics::{
    spawn_reporter, MetricsRegistry, MetricsSnapshot, RepoCounters, SharedMetricsRegistry,
};
pub use shutdown::{RemoveDirectory, ShutdownRegistry, TeardownAction};
