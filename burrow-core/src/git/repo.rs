//! Inspection of clones found in leased directories

use std::path::{Path, PathBuf};

use git2::Repository;

use crate::{Error, Result};

/// A clone sitting in a leased directory
pub struct ClonedRepo {
    /// The underlying git2 repository
    repo: Repository,
    /// Working directory root
    root: PathBuf,
}

impl std::fmt::Debug for ClonedRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClonedRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl ClonedRepo {
    /// Open the clone whose working directory is exactly `path`
    ///
    /// Unlike discovery, this does not search parent directories: a leased
    /// directory either is a clone or it is not.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = Repository::open(path)
            .map_err(|e| Error::Git(format!("{} is not a git clone: {}", path.display(), e)))?;

        let root = repo
            .workdir()
            .ok_or_else(|| Error::Git(format!("{} is a bare repository", path.display())))?
            .to_path_buf();

        Ok(Self { repo, root })
    }

    /// Working directory root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// URL of the `origin` remote, if any
    pub fn origin_url(&self) -> Option<String> {
        self.repo
            .find_remote("origin")
            .ok()
            .and_then(|remote| remote.url().map(|u| u.to_string()))
    }

    /// Get the current branch name
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(Error::Git(format!("Failed to get HEAD: {}", e))),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            // Detached HEAD
            Ok(None)
        }
    }
}

/// Whether `path` holds a clone of `clone_url` that can be fetched in place
pub fn is_usable_clone(path: &Path, clone_url: &str) -> bool {
    let repo = match ClonedRepo::open(path) {
        Ok(repo) => repo,
        Err(e) => {
            tracing::debug!("{}", e);
            return false;
        }
    };

    let same_dir = match (repo.root().canonicalize(), path.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if !same_dir {
        return false;
    }

    match repo.origin_url() {
        Some(url) => same_remote(&url, clone_url),
        None => false,
    }
}

fn same_remote(a: &str, b: &str) -> bool {
    fn normalize(url: &str) -> &str {
        url.trim_end_matches('/').trim_end_matches(".git")
    }
    normalize(a) == normalize(b)
}
