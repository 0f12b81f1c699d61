//! Reuse and fallback counters for leased clone directories

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::lease::RepoKey;

/// Shortest accepted reporting period
const MIN_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Counters for one repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepoCounters {
    /// Leases served from the stable directory
    pub reuses: u64,
    /// Leases that found the stable directory locked and went transient
    pub fallbacks: u64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MetricsSnapshot(BTreeMap<RepoKey, RepoCounters>);

impl MetricsSnapshot {
    /// Counters for `key`, zero if never seen
    pub fn get(&self, key: &RepoKey) -> RepoCounters {
        self.0.get(key).copied().unwrap_or_default()
    }

    /// Number of repositories with recorded activity
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate repositories in key order
    pub fn iter(&self) -> impl Iterator<Item = (&RepoKey, &RepoCounters)> {
        self.0.iter()
    }

    /// One line per repository, for logs and terminal output
    pub fn summary(&self) -> String {
        if self.0.is_empty() {
            return "no clone directories leased".to_string();
        }
        self.0
            .iter()
            .map(|(key, c)| format!("{}: {} reused, {} fell back", key, c.reuses, c.fallbacks))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Process-lifetime counters shared by every lease manager that holds it
///
/// Counters only ever go up.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: Mutex<BTreeMap<RepoKey, RepoCounters>>,
}

impl MetricsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn counters_mut(&self) -> MutexGuard<'_, BTreeMap<RepoKey, RepoCounters>> {
        // Counter updates cannot leave the map inconsistent, so poisoning is ignored
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a lease served from the stable directory
    pub fn record_reuse(&self, key: &RepoKey) {
        self.counters_mut().entry(key.clone()).or_default().reuses += 1;
    }

    /// Count a lease that fell back to a transient directory
    pub fn record_fallback(&self, key: &RepoKey) {
        self.counters_mut().entry(key.clone()).or_default().fallbacks += 1;
    }

    /// Current counters for `key`
    pub fn counters(&self, key: &RepoKey) -> RepoCounters {
        self.counters_mut().get(key).copied().unwrap_or_default()
    }

    /// Copy of all counters
    pub fn report(&self) -> MetricsSnapshot {
        MetricsSnapshot(self.counters_mut().clone())
    }

    /// Human-readable summary of the current counters
    pub fn summary(&self) -> String {
        self.report().summary()
    }
}

/// Registry handle shared between lease managers and the reporter
pub type SharedMetricsRegistry = Arc<MetricsRegistry>;

/// Log a snapshot of `registry` every `period`, until the task is aborted
pub fn spawn_reporter(registry: SharedMetricsRegistry, period: Duration) -> JoinHandle<()> {
    let period = period.max(MIN_REPORT_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let snapshot = registry.report();
            tracing::info!(
                repos = snapshot.len(),
                "Clone directory lease metrics:\n{}",
                snapshot.summary()
            );
        }
    })
}
