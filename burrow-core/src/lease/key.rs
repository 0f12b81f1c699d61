//! Repository identity used to key stable directories and metrics

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};

use crate::{Error, Result};

/// Directory under the base reserved for lock files and discard scratch
/// space; no owner may be named like it
pub const RESERVED_DIR: &str = ".burrow";

/// `owner/repo` pair naming one stable clone directory
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoKey {
    owner: String,
    repo: String,
}

impl RepoKey {
    /// Build a key, rejecting names that are not a single path component
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        let repo = repo.into();
        validate_component(&owner, "owner")?;
        validate_component(&repo, "repository")?;
        if owner == RESERVED_DIR {
            return Err(Error::InvalidKey(format!(
                "owner name '{}' is reserved",
                owner
            )));
        }
        Ok(Self { owner, repo })
    }

    /// Parse `owner/repo`
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().split_once('/') {
            Some((owner, repo)) => Self::new(owner, repo),
            None => Err(Error::InvalidKey(format!(
                "{}: expected owner/repo",
                input
            ))),
        }
    }

    /// Repository owner or organization
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// `base/owner/repo`
    pub fn path_under(&self, base: &Path) -> PathBuf {
        base.join(&self.owner).join(&self.repo)
    }

    /// `base/.burrow/locks/owner/repo.lock`
    ///
    /// Kept out of the `owner/repo` tree, so no repository name can collide
    /// with another repository's lock file.
    pub fn lock_file_under(&self, base: &Path) -> PathBuf {
        base.join(RESERVED_DIR)
            .join("locks")
            .join(&self.owner)
            .join(format!("{}.lock", self.repo))
    }
}

fn validate_component(value: &str, what: &str) -> Result<()> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(Error::InvalidKey(format!("{} name '{}' is not usable", what, value)));
    }
    if value.contains(['/', '\\', ':', '\0']) {
        return Err(Error::InvalidKey(format!(
            "{} name '{}' contains a path separator",
            what, value
        )));
    }
    Ok(())
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl Serialize for RepoKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
