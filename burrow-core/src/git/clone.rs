//! Repository URLs and filling leased directories with `git`

use std::ffi::OsString;
use std::path::Path;

use tokio::process::Command;

use crate::lease::{DirectoryLease, LeaseKind, LeaseOptions, RepoKey};
use crate::{Error, Result};

/// Where a repository lives and how to clone it
#[derive(Debug, Clone)]
pub struct RepoUrl {
    key: RepoKey,
    /// Full clone URL
    pub clone_url: String,
    /// Host (e.g., "github.com")
    pub host: String,
}

/// Host and `owner/repo` path pulled out of one of the accepted forms
struct Location {
    host: String,
    path: String,
    /// `None` for shorthand, where the URL is built from the key
    clone_url: Option<String>,
}

impl RepoUrl {
    /// Parse a repository URL or shorthand
    ///
    /// Supports:
    /// - `https://github.com/owner/repo` (trailing path segments are ignored)
    /// - `https://github.com/owner/repo.git`
    /// - `git@github.com:owner/repo.git`
    /// - `owner/repo` (assumes GitHub)
    ///
    /// Owner and repository must form a valid [`RepoKey`], since they name
    /// the clone directory.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let location = locate(input).ok_or_else(|| {
            Error::Config(format!(
                "Invalid repository URL: {}. Expected format: owner/repo, https://github.com/owner/repo, or git@github.com:owner/repo.git",
                input
            ))
        })?;

        let path = location.path.trim_matches('/');
        let key = RepoKey::parse(path.strip_suffix(".git").unwrap_or(path))?;
        let clone_url = location
            .clone_url
            .unwrap_or_else(|| format!("https://{}/{}.git", location.host, key));

        Ok(Self {
            key,
            clone_url,
            host: location.host,
        })
    }

    /// Lease key for this repository
    pub fn key(&self) -> &RepoKey {
        &self.key
    }
}

fn locate(input: &str) -> Option<Location> {
    if let Some(rest) = input.strip_prefix("git@") {
        let (host, path) = rest.split_once(':')?;
        return Some(Location {
            host: host.to_string(),
            path: path.to_string(),
            clone_url: Some(input.to_string()),
        });
    }

    if input.starts_with("https://") || input.starts_with("http://") {
        let url = url::Url::parse(input).ok()?;
        let host = url.host_str()?.to_string();
        // owner and repo only; `/tree/main` and the like are dropped
        let path = url
            .path_segments()?
            .filter(|s| !s.is_empty())
            .take(2)
            .collect::<Vec<_>>()
            .join("/");
        let clone_url = if input.ends_with(".git") {
            input.to_string()
        } else {
            format!("{}.git", input.trim_end_matches('/'))
        };
        return Some(Location {
            host,
            path,
            clone_url: Some(clone_url),
        });
    }

    if input.contains("://") || input.contains('@') {
        return None;
    }

    Some(Location {
        host: "github.com".to_string(),
        path: input.to_string(),
        clone_url: None,
    })
}

/// Depth to clone with, or `None` for full history
///
/// Stable clones are kept deep so they can be fetched into later; transient
/// ones are thrown away and default to a single commit.
pub fn clone_depth(opts: &LeaseOptions, transient: bool) -> Option<u32> {
    if opts.always_deep {
        return None;
    }
    match opts.depth {
        Some(depth) => Some(depth),
        None if transient => Some(1),
        None => None,
    }
}

/// Arguments for `git clone` into `target`
pub fn clone_args(
    url: &RepoUrl,
    branch: &str,
    opts: &LeaseOptions,
    transient: bool,
    target: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["clone".into()];

    if let Some(depth) = clone_depth(opts, transient) {
        args.push("--depth".into());
        args.push(depth.to_string().into());
    }

    args.push(if opts.no_single_branch {
        "--no-single-branch".into()
    } else {
        "--single-branch".into()
    });

    args.push("--branch".into());
    args.push(branch.into());
    args.push(url.clone_url.as_str().into());
    args.push(target.as_os_str().to_owned());
    args
}

/// Arguments for bringing an existing clone to the tip of `branch`
pub fn refresh_args(branch: &str, opts: &LeaseOptions) -> Vec<Vec<String>> {
    let remote_ref = format!("origin/{}", branch);
    let checkout = if opts.detach_head {
        vec![
            "checkout".to_string(),
            "--force".to_string(),
            "--detach".to_string(),
            remote_ref,
        ]
    } else {
        vec![
            "checkout".to_string(),
            "--force".to_string(),
            "-B".to_string(),
            branch.to_string(),
            remote_ref,
        ]
    };

    vec![
        vec![
            "fetch".to_string(),
            "--prune".to_string(),
            "origin".to_string(),
            format!("+refs/heads/{}:refs/remotes/origin/{}", branch, branch),
        ],
        checkout,
        vec!["clean".to_string(), "-dfx".to_string()],
    ]
}

/// Run git and return stdout
async fn run_git<I, S>(cwd: Option<&Path>, args: I, url: &RepoUrl) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| Error::Git(format!("Failed to run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);

        // Check for common error types
        if stderr.contains("Authentication failed") || stderr.contains("Permission denied") {
            return Err(Error::Git(format!(
                "Authentication failed for {}. Check your credentials or repository access.",
                url.clone_url
            )));
        }

        if stderr.contains("Could not resolve host") || stderr.contains("unable to access") {
            return Err(Error::Git(format!(
                "Network error reaching {}. Check your internet connection.",
                url.clone_url
            )));
        }

        if stderr.contains("not found") || stderr.contains("does not exist") {
            return Err(Error::Git(format!(
                "Repository or branch not found: {}. Check the URL is correct.",
                url.clone_url
            )));
        }

        return Err(Error::Git(format!("git failed: {}", stderr.trim())));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Bring the leased directory to `branch` of `url`
///
/// Clones into a fresh directory, or fetches and hard-resets an existing
/// clone, depending on the lease kind.
pub async fn populate(
    lease: &DirectoryLease,
    url: &RepoUrl,
    branch: &str,
    opts: &LeaseOptions,
) -> Result<()> {
    match lease.kind() {
        LeaseKind::NeedsPopulation => {
            tracing::debug!(path = %lease.path().display(), url = %url.clone_url, "Cloning");
            let args = clone_args(url, branch, opts, lease.is_transient(), lease.path());
            run_git(None, args, url).await?;

            if opts.detach_head {
                run_git(Some(lease.path()), ["checkout", "--detach"], url).await?;
            }
        }
        LeaseKind::AlreadyPopulated => {
            tracing::debug!(path = %lease.path().display(), url = %url.clone_url, "Refreshing clone");
            for args in refresh_args(branch, opts) {
                run_git(Some(lease.path()), args, url).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_parse_shorthand() {
        let url = RepoUrl::parse("owner/repo").unwrap();
        assert_eq!(url.key().owner(), "owner");
        assert_eq!(url.key().repo(), "repo");
        assert_eq!(url.host, "github.com");
        assert_eq!(url.clone_url, "https://github.com/owner/repo.git");
    }

    #[test]
    fn test_parse_https() {
        let url = RepoUrl::parse("https://github.com/owner/repo").unwrap();
        assert_eq!(url.key().to_string(), "owner/repo");
        assert_eq!(url.clone_url, "https://github.com/owner/repo.git");

        let url = RepoUrl::parse("https://git.example.com/acme/widgets.git").unwrap();
        assert_eq!(url.key().to_string(), "acme/widgets");
        assert_eq!(url.host, "git.example.com");
        assert_eq!(url.clone_url, "https://git.example.com/acme/widgets.git");
    }

    #[test]
    fn test_parse_https_ignores_trailing_segments() {
        let url = RepoUrl::parse("https://github.com/acme/widgets/tree/main").unwrap();
        assert_eq!(url.key().to_string(), "acme/widgets");
    }

    #[test]
    fn test_parse_git_ssh() {
        let url = RepoUrl::parse("git@github.com:owner/repo.git").unwrap();
        assert_eq!(url.key().to_string(), "owner/repo");
        assert_eq!(url.host, "github.com");
        assert_eq!(url.clone_url, "git@github.com:owner/repo.git");
    }

    #[test]
    fn test_parse_dot_named_repo() {
        let url = RepoUrl::parse("acme/.github").unwrap();
        assert_eq!(url.key().repo(), ".github");
        assert_eq!(url.clone_url, "https://github.com/acme/.github.git");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(RepoUrl::parse("invalid").is_err());
        assert!(RepoUrl::parse("").is_err());
        assert!(RepoUrl::parse("/repo").is_err());
        assert!(RepoUrl::parse("ftp://github.com/owner/repo").is_err());
        assert!(RepoUrl::parse("https://github.com/owner").is_err());
    }

    #[test]
    fn test_parse_rejects_unusable_keys() {
        assert!(matches!(
            RepoUrl::parse("acme/.."),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            RepoUrl::parse("git@github.com:.burrow/widgets.git"),
            Err(Error::InvalidKey(_))
        ));
        assert!(RepoUrl::parse("acme/widgets/extra").is_err());
    }

    #[test]
    fn test_transient_clone_is_shallow() {
        let url = RepoUrl::parse("acme/widgets").unwrap();
        let args = clone_args(
            &url,
            "main",
            &LeaseOptions::default(),
            true,
            Path::new("/tmp/burrow-acme-widgets-x"),
        );
        assert_eq!(
            strings(&args),
            vec![
                "clone",
                "--depth",
                "1",
                "--single-branch",
                "--branch",
                "main",
                "https://github.com/acme/widgets.git",
                "/tmp/burrow-acme-widgets-x",
            ]
        );
    }

    #[test]
    fn test_stable_clone_is_deep() {
        let url = RepoUrl::parse("acme/widgets").unwrap();
        let opts = LeaseOptions {
            no_single_branch: true,
            ..Default::default()
        };
        let args = strings(&clone_args(&url, "main", &opts, false, Path::new("/base/acme/widgets")));
        assert!(!args.contains(&"--depth".to_string()));
        assert!(args.contains(&"--no-single-branch".to_string()));
    }

    #[test]
    fn test_depth_hints() {
        let explicit = LeaseOptions {
            depth: Some(50),
            ..Default::default()
        };
        assert_eq!(clone_depth(&explicit, false), Some(50));
        assert_eq!(clone_depth(&explicit, true), Some(50));

        let deep = LeaseOptions {
            always_deep: true,
            depth: Some(50),
            ..Default::default()
        };
        assert_eq!(clone_depth(&deep, true), None);
    }

    #[test]
    fn test_refresh_detached() {
        let opts = LeaseOptions {
            detach_head: true,
            ..Default::default()
        };
        let steps = refresh_args("release", &opts);
        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps[0].last().unwrap(),
            "+refs/heads/release:refs/remotes/origin/release"
        );
        assert_eq!(steps[1], vec!["checkout", "--force", "--detach", "origin/release"]);
        assert_eq!(steps[2], vec!["clean", "-dfx"]);
    }

    #[test]
    fn test_refresh_on_branch() {
        let steps = refresh_args("main", &LeaseOptions::default());
        assert_eq!(steps[1], vec!["checkout", "--force", "-B", "main", "origin/main"]);
    }
}
