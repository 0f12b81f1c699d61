//! Teardown actions run by the host before it exits
//!
//! Components register actions as they need them; the host owns the registry
//! and calls [`ShutdownRegistry::run`] once on its way out.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{Error, Result};

/// A single piece of cleanup work
#[async_trait]
pub trait TeardownAction: Send + Sync + fmt::Debug {
    /// Short description for logs
    fn describe(&self) -> String;

    /// Do the cleanup
    async fn run(&self) -> Result<()>;
}

/// Recursively remove a directory
#[derive(Debug, Clone)]
pub struct RemoveDirectory {
    path: PathBuf,
}

impl RemoveDirectory {
    /// Remove `path` on shutdown
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl TeardownAction for RemoveDirectory {
    fn describe(&self) -> String {
        format!("remove {}", self.path.display())
    }

    async fn run(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::fs("remove directory", &self.path, e)),
        }
    }
}

/// Ordered set of teardown actions
#[derive(Debug, Default)]
pub struct ShutdownRegistry {
    actions: Mutex<Vec<Arc<dyn TeardownAction>>>,
}

impl ShutdownRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn actions(&self) -> MutexGuard<'_, Vec<Arc<dyn TeardownAction>>> {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an action to run at shutdown
    pub fn register(&self, action: Arc<dyn TeardownAction>) {
        tracing::debug!(action = %action.describe(), "Registered teardown action");
        self.actions().push(action);
    }

    /// Number of pending actions
    pub fn len(&self) -> usize {
        self.actions().len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.actions().is_empty()
    }

    /// Run pending actions, most recently registered first
    ///
    /// Every action runs even if an earlier one fails. Returns the number of
    /// failures. Actions are consumed, so a second call does nothing.
    pub async fn run(&self) -> usize {
        let actions = std::mem::take(&mut *self.actions());
        let mut failures = 0;

        for action in actions.into_iter().rev() {
            match action.run().await {
                Ok(()) => tracing::debug!(action = %action.describe(), "Teardown complete"),
                Err(e) => {
                    failures += 1;
                    tracing::warn!("Teardown '{}' failed: {}", action.describe(), e);
                }
            }
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl TeardownAction for Record {
        fn describe(&self) -> String {
            self.name.to_string()
        }

        async fn run(&self) -> Result<()> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                Err(Error::Other(format!("{} failed", self.name)))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_runs_in_reverse_order_despite_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ShutdownRegistry::new();
        for (name, fail) in [("first", false), ("second", true), ("third", false)] {
            registry.register(Arc::new(Record {
                name,
                log: log.clone(),
                fail,
            }));
        }

        assert_eq!(registry.run().await, 1);
        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_second_run_is_empty() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("clones");
        std::fs::create_dir_all(dir.join("acme")).unwrap();

        let registry = ShutdownRegistry::new();
        registry.register(Arc::new(RemoveDirectory::new(&dir)));

        assert_eq!(registry.run().await, 0);
        assert!(!dir.exists());
        assert!(registry.is_empty());
        assert_eq!(registry.run().await, 0);
    }

    #[tokio::test]
    async fn test_remove_missing_directory_is_ok() {
        let temp = TempDir::new().unwrap();
        let action = RemoveDirectory::new(temp.path().join("absent"));
        action.run().await.unwrap();
    }
}
