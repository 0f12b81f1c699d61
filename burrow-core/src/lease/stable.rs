//! Long-lived clone directories, one per repository
//!
//! Layout is `base_dir/owner/repo`. The presence of a non-empty directory
//! there is the only record that a clone exists; there is no index file.
//! Lock files and discard scratch space live under `base_dir/.burrow`, which
//! no owner can be named.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::key::RESERVED_DIR;
use super::lock::{self, LockOutcome};
use super::{DirectoryLease, LeaseDirectoryProvider, LeaseKind, LeaseOptions, RepoKey};
use crate::shutdown::{RemoveDirectory, ShutdownRegistry};
use crate::{Error, Result};

/// Prefix of the scratch directories used to discard clones
const DISCARD_PREFIX: &str = "discard-";

/// Stable provider configuration
#[derive(Debug, Clone)]
pub struct StableConfig {
    /// Hand out existing clones instead of starting fresh each time
    pub reuse: bool,
    /// Remove `base_dir` when the host runs its shutdown registry
    pub clean_on_process_exit: bool,
    /// Root of the `owner/repo` tree
    pub base_dir: PathBuf,
}

/// Provider of per-repository directories under a base directory
#[derive(Debug)]
pub struct StableDirectoryProvider {
    config: StableConfig,
    shutdown: Arc<ShutdownRegistry>,
    cleanup_registered: AtomicBool,
}

impl StableDirectoryProvider {
    /// Create a provider; cleanup (if configured) is registered with `shutdown`
    pub fn new(config: StableConfig, shutdown: Arc<ShutdownRegistry>) -> Self {
        Self {
            config,
            shutdown,
            cleanup_registered: AtomicBool::new(false),
        }
    }

    /// Provider configuration
    pub fn config(&self) -> &StableConfig {
        &self.config
    }

    /// Stable directory for `key`
    pub fn candidate_path(&self, key: &RepoKey) -> PathBuf {
        key.path_under(&self.config.base_dir)
    }

    /// Sentinel file guarding the stable directory for `key`
    pub fn lock_file(&self, key: &RepoKey) -> PathBuf {
        key.lock_file_under(&self.config.base_dir)
    }

    /// Where doomed directories are moved before being deleted
    pub fn scratch_dir(&self) -> PathBuf {
        scratch_dir_under(&self.config.base_dir)
    }

    /// Try to lock the stable directory for `key` without waiting
    pub async fn lock(&self, key: &RepoKey) -> LockOutcome {
        lock::acquire(&self.candidate_path(key), &self.lock_file(key)).await
    }

    /// Every repository with a directory under the base, in path order
    ///
    /// Entries that cannot form a [`RepoKey`] are skipped with a warning.
    pub async fn cached_keys(&self) -> Result<Vec<RepoKey>> {
        let base = &self.config.base_dir;
        let mut keys = Vec::new();

        for owner in subdirectory_names(base).await? {
            if owner == RESERVED_DIR {
                continue;
            }
            for repo in subdirectory_names(&base.join(&owner)).await? {
                match RepoKey::new(owner.as_str(), repo.as_str()) {
                    Ok(key) => keys.push(key),
                    Err(e) => tracing::warn!("Skipping {}/{}: {}", owner, repo, e),
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Make sure the stable directory for `key` exists, without touching
    /// anything already in it
    pub async fn prepare(&self, key: &RepoKey) -> Result<PathBuf> {
        let candidate = self.candidate_path(key);
        tokio::fs::create_dir_all(&candidate)
            .await
            .map_err(|e| Error::fs("create directory", &candidate, e))?;
        Ok(candidate)
    }

    fn register_cleanup(&self) {
        if !self.config.clean_on_process_exit {
            return;
        }
        if !self.cleanup_registered.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                base_dir = %self.config.base_dir.display(),
                "Registering clone cache cleanup on shutdown"
            );
            self.shutdown
                .register(Arc::new(RemoveDirectory::new(&self.config.base_dir)));
        }
    }
}

#[async_trait]
impl LeaseDirectoryProvider for StableDirectoryProvider {
    async fn provide(
        &self,
        key: &RepoKey,
        _branch: &str,
        _opts: &LeaseOptions,
    ) -> Result<DirectoryLease> {
        self.register_cleanup();
        let candidate = self.candidate_path(key);

        if self.config.reuse && has_entries(&candidate).await? {
            tracing::debug!(path = %candidate.display(), "Reusing existing clone directory");
            return Ok(DirectoryLease::stable(
                candidate.clone(),
                self.scratch_dir(),
                LeaseKind::AlreadyPopulated,
                format!("reusing existing clone at {}", candidate.display()),
            ));
        }

        reset_directory(&candidate, &self.scratch_dir()).await?;

        Ok(DirectoryLease::stable(
            candidate.clone(),
            self.scratch_dir(),
            LeaseKind::NeedsPopulation,
            format!("fresh stable directory at {}", candidate.display()),
        ))
    }
}

/// `base/.burrow/discard`
pub(crate) fn scratch_dir_under(base: &Path) -> PathBuf {
    base.join(RESERVED_DIR).join("discard")
}

/// Names of the directories directly inside `dir`; none if it is missing
async fn subdirectory_names(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::fs("read directory", dir, e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::fs("read directory", dir, e))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        if !is_dir {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => tracing::warn!("Skipping non UTF-8 directory {:?}", name),
        }
    }
    Ok(names)
}

/// Whether `dir` exists and has anything in it
async fn has_entries(dir: &Path) -> Result<bool> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::fs("read directory", dir, e)),
    };
    let first = entries
        .next_entry()
        .await
        .map_err(|e| Error::fs("read directory", dir, e))?;
    Ok(first.is_some())
}

/// Replace `path` with an empty directory
pub(crate) async fn reset_directory(path: &Path, scratch: &Path) -> Result<()> {
    discard_directory(path, scratch).await?;
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::fs("create directory", path, e))
}

/// Remove `path` so that it is either fully there or fully gone
///
/// The directory is renamed into a fresh directory under `scratch` first,
/// which is atomic on one filesystem, and only then deleted. Failing to
/// rename is an error and leaves `path` untouched; failing to delete the
/// scratch copy is only logged.
pub(crate) async fn discard_directory(path: &Path, scratch: &Path) -> Result<()> {
    let path = path.to_path_buf();
    let scratch = scratch.to_path_buf();
    tokio::task::spawn_blocking(move || discard_blocking(&path, &scratch))
        .await
        .map_err(|e| Error::Other(format!("Discard task failed: {}", e)))?
}

fn discard_blocking(path: &Path, scratch_root: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::fs("inspect", path, e)),
    }

    std::fs::create_dir_all(scratch_root)
        .map_err(|e| Error::fs("create scratch directory", scratch_root, e))?;

    let scratch = tempfile::Builder::new()
        .prefix(DISCARD_PREFIX)
        .tempdir_in(scratch_root)
        .map_err(|e| Error::fs("create scratch directory in", scratch_root, e))?;

    std::fs::rename(path, scratch.path().join("discarded"))
        .map_err(|e| Error::fs("move aside", path, e))?;

    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        tracing::warn!("Failed to delete discarded clone {:?}: {}", scratch_path, e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn provider(base: &Path, reuse: bool) -> StableDirectoryProvider {
        StableDirectoryProvider::new(
            StableConfig {
                reuse,
                clean_on_process_exit: false,
                base_dir: base.to_path_buf(),
            },
            Arc::new(ShutdownRegistry::new()),
        )
    }

    fn key() -> RepoKey {
        RepoKey::new("acme", "widgets").unwrap()
    }

    #[tokio::test]
    async fn test_first_request_needs_population() {
        let temp = TempDir::new().unwrap();
        let stable = provider(temp.path(), true);

        let lease = stable
            .provide(&key(), "main", &LeaseOptions::default())
            .await
            .unwrap();

        assert_eq!(lease.path(), temp.path().join("acme").join("widgets"));
        assert_eq!(lease.kind(), LeaseKind::NeedsPopulation);
        assert!(!lease.is_transient());
        assert!(lease.path().is_dir());
        lease.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_clone_is_reused() {
        let temp = TempDir::new().unwrap();
        let stable = provider(temp.path(), true);
        let clone_dir = temp.path().join("acme").join("widgets");
        std::fs::create_dir_all(clone_dir.join(".git")).unwrap();

        let lease = stable
            .provide(&key(), "main", &LeaseOptions::default())
            .await
            .unwrap();

        assert_eq!(lease.kind(), LeaseKind::AlreadyPopulated);
        assert_eq!(lease.path(), clone_dir);
        assert!(clone_dir.join(".git").exists());
        lease.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_reuse_starts_fresh() {
        let temp = TempDir::new().unwrap();
        let stable = provider(temp.path(), false);
        let clone_dir = temp.path().join("acme").join("widgets");
        std::fs::create_dir_all(clone_dir.join(".git")).unwrap();

        let lease = stable
            .provide(&key(), "main", &LeaseOptions::default())
            .await
            .unwrap();

        assert_eq!(lease.kind(), LeaseKind::NeedsPopulation);
        assert!(lease.path().is_dir());
        assert!(!clone_dir.join(".git").exists());
        lease.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_other_repos_of_owner_survive_reset() {
        let temp = TempDir::new().unwrap();
        let stable = provider(temp.path(), false);
        let sibling = temp.path().join("acme").join("gadgets");
        std::fs::create_dir_all(sibling.join(".git")).unwrap();

        let lease = stable
            .provide(&key(), "main", &LeaseOptions::default())
            .await
            .unwrap();

        assert!(sibling.join(".git").exists());
        lease.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_prepare_keeps_contents() {
        let temp = TempDir::new().unwrap();
        let stable = provider(temp.path(), true);
        let clone_dir = temp.path().join("acme").join("widgets");
        std::fs::create_dir_all(clone_dir.join(".git")).unwrap();

        let prepared = stable.prepare(&key()).await.unwrap();

        assert_eq!(prepared, clone_dir);
        assert!(clone_dir.join(".git").exists());
    }

    #[tokio::test]
    async fn test_cleanup_registered_once() {
        let temp = TempDir::new().unwrap();
        let shutdown = Arc::new(ShutdownRegistry::new());
        let base = temp.path().join("clones");
        let stable = StableDirectoryProvider::new(
            StableConfig {
                reuse: true,
                clean_on_process_exit: true,
                base_dir: base.clone(),
            },
            shutdown.clone(),
        );

        for _ in 0..3 {
            let lease = stable
                .provide(&key(), "main", &LeaseOptions::default())
                .await
                .unwrap();
            lease.release().await.unwrap();
        }

        assert_eq!(shutdown.len(), 1);
        assert!(base.exists());
        assert_eq!(shutdown.run().await, 0);
        assert!(!base.exists());
    }

    #[tokio::test]
    async fn test_reset_leaves_empty_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("acme").join("widgets");
        let scratch = scratch_dir_under(temp.path());
        std::fs::create_dir_all(dir.join(".git").join("objects")).unwrap();

        reset_directory(&dir, &scratch).await.unwrap();

        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        // the scratch copy is gone and nothing was left next to the clone
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(temp.path().join("acme")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_discard_missing_directory_is_ok() {
        let temp = TempDir::new().unwrap();
        discard_directory(&temp.path().join("absent"), &scratch_dir_under(temp.path()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_discard_fails_without_scratch_space() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("acme").join("widgets");
        std::fs::create_dir_all(dir.join(".git")).unwrap();
        // a file where the scratch directory should go
        let scratch = temp.path().join("scratch");
        std::fs::write(&scratch, "").unwrap();

        let err = discard_directory(&dir, &scratch).await.unwrap_err();

        assert!(matches!(err, Error::Fs { .. }));
        assert!(dir.join(".git").exists());
    }

    #[tokio::test]
    async fn test_cached_keys_include_dot_named_repos() {
        let temp = TempDir::new().unwrap();
        let stable = provider(temp.path(), true);
        for repo in ["widgets", ".github", ".widgets.lock"] {
            std::fs::create_dir_all(temp.path().join("acme").join(repo)).unwrap();
        }
        std::fs::write(temp.path().join("acme").join("README"), "").unwrap();

        // bookkeeping directories are not repositories
        let lease = stable
            .provide(&key(), "main", &LeaseOptions::default())
            .await
            .unwrap();
        lease.invalidate().await.unwrap();
        let LockOutcome::Acquired(held) = stable.lock(&key()).await else {
            panic!("lock should be free");
        };
        held.release().await.unwrap();
        assert!(temp.path().join(RESERVED_DIR).is_dir());

        let keys: Vec<String> = stable
            .cached_keys()
            .await
            .unwrap()
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, vec!["acme/.github", "acme/.widgets.lock", "acme/widgets"]);
    }

    #[tokio::test]
    async fn test_cached_keys_of_missing_base() {
        let temp = TempDir::new().unwrap();
        let stable = provider(&temp.path().join("absent"), true);
        assert!(stable.cached_keys().await.unwrap().is_empty());
    }
}
