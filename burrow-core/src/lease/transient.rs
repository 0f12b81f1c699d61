//! Throwaway clone directories

use std::path::PathBuf;

use async_trait::async_trait;

use super::{DirectoryLease, LeaseDirectoryProvider, LeaseOptions, RepoKey};
use crate::{Error, Result};

/// Provider of a fresh temp directory per request
#[derive(Debug, Clone, Default)]
pub struct TransientDirectoryProvider {
    /// Where to create directories; the OS temp dir when unset
    root: Option<PathBuf>,
}

impl TransientDirectoryProvider {
    /// Create directories in the OS temp dir
    pub fn new() -> Self {
        Self::default()
    }

    /// Create directories under `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

#[async_trait]
impl LeaseDirectoryProvider for TransientDirectoryProvider {
    async fn provide(
        &self,
        key: &RepoKey,
        _branch: &str,
        opts: &LeaseOptions,
    ) -> Result<DirectoryLease> {
        let prefix = format!("burrow-{}-{}-", key.owner(), key.repo());
        let root = self.root.clone();

        let path = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            let mut builder = tempfile::Builder::new();
            builder.prefix(&prefix);
            let dir = match &root {
                Some(root) => {
                    std::fs::create_dir_all(root)
                        .map_err(|e| Error::fs("create directory", root, e))?;
                    builder
                        .tempdir_in(root)
                        .map_err(|e| Error::fs("create temp directory in", root, e))?
                }
                None => builder
                    .tempdir()
                    .map_err(|e| Error::fs("create temp directory in", std::env::temp_dir(), e))?,
            };
            // Lifetime is managed by the lease from here on
            Ok(dir.keep())
        })
        .await
        .map_err(|e| Error::Other(format!("Temp directory task failed: {}", e)))??;

        tracing::debug!(path = %path.display(), repo = %key, "Created transient clone directory");

        Ok(DirectoryLease::transient(
            path.clone(),
            opts.keep,
            format!("transient directory at {}", path.display()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::LeaseKind;
    use tempfile::TempDir;

    fn key() -> RepoKey {
        RepoKey::new("acme", "widgets").unwrap()
    }

    #[tokio::test]
    async fn test_release_deletes_directory() {
        let temp = TempDir::new().unwrap();
        let transient = TransientDirectoryProvider::with_root(temp.path());

        let lease = transient
            .provide(&key(), "main", &LeaseOptions::default())
            .await
            .unwrap();
        let path = lease.path().to_path_buf();

        assert!(path.is_dir());
        assert!(lease.is_transient());
        assert_eq!(lease.kind(), LeaseKind::NeedsPopulation);

        lease.release().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_keep_survives_release() {
        let temp = TempDir::new().unwrap();
        let transient = TransientDirectoryProvider::with_root(temp.path());
        let opts = LeaseOptions {
            keep: true,
            ..Default::default()
        };

        let lease = transient.provide(&key(), "main", &opts).await.unwrap();
        let path = lease.path().to_path_buf();
        lease.release().await.unwrap();

        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn test_each_request_gets_own_directory() {
        let temp = TempDir::new().unwrap();
        let transient = TransientDirectoryProvider::with_root(temp.path());
        let opts = LeaseOptions::default();

        let a = transient.provide(&key(), "main", &opts).await.unwrap();
        let b = transient.provide(&key(), "main", &opts).await.unwrap();
        assert_ne!(a.path(), b.path());

        a.release().await.unwrap();
        b.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_is_noop() {
        let temp = TempDir::new().unwrap();
        let transient = TransientDirectoryProvider::with_root(temp.path());
        let opts = LeaseOptions {
            keep: true,
            ..Default::default()
        };

        let lease = transient.provide(&key(), "main", &opts).await.unwrap();
        let path = lease.path().to_path_buf();
        lease.invalidate().await.unwrap();

        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn test_release_of_vanished_directory_is_swallowed() {
        let temp = TempDir::new().unwrap();
        let transient = TransientDirectoryProvider::with_root(temp.path());

        let lease = transient
            .provide(&key(), "main", &LeaseOptions::default())
            .await
            .unwrap();
        std::fs::remove_dir_all(lease.path()).unwrap();

        lease.release().await.unwrap();
    }
}
