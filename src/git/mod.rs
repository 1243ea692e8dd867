//! Git extraction module
//!
//! Pulls raw facts out of repositories: non-merge commits with numstat line
//! counts per month window, and per-author line counts from blame at HEAD.
//!
//! Repository validity and HEAD come from libgit2; log and blame run the
//! `git` binary under a timeout with one retry.
//!
//! # Example
//!
//! ```no_run
//! use gitcensus::git::{GitOptions, HistoryExtractor};
//! use gitcensus::period::Month;
//! use std::path::Path;
//!
//! let history = HistoryExtractor::new("acme/core", Path::new("repos/acme/core"), GitOptions::default());
//! let commits = history.extract_month(Month::new(2025, 3).unwrap()).unwrap();
//! ```

pub mod blame;
pub mod history;

pub use blame::{parse_line_porcelain, BlameExtractor, BlameOutcome};
pub use history::{parse_log, resolve_rename, HistoryExtractor};

use git2::Repository;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::Settings;
use crate::exec::{ProcessError, ToolCommand};

/// Repository-level failures. These exclude a repository from the run.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("repository path {0} does not exist")]
    Missing(PathBuf),

    #[error("{path} is not a git repository: {source}")]
    NotARepository {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("repository {0} has no commits")]
    NoHead(PathBuf),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Limits applied to every git subprocess.
#[derive(Debug, Clone, Copy)]
pub struct GitOptions {
    pub timeout: Duration,
    pub backoff: Duration,
}

impl Default for GitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            backoff: Duration::from_millis(500),
        }
    }
}

impl GitOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: settings.git_timeout(),
            backoff: settings.retry_backoff(),
        }
    }

    pub(crate) fn command(&self, repo: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::git(repo);
        cmd.timeout(self.timeout).backoff(self.backoff);
        cmd
    }
}

/// Open a repository exactly at `path` (no upward discovery).
pub fn open_repository(path: &Path) -> Result<Repository, GitError> {
    if !path.exists() {
        return Err(GitError::Missing(path.to_path_buf()));
    }
    Repository::open(path).map_err(|source| GitError::NotARepository {
        path: path.to_path_buf(),
        source,
    })
}

/// Full id of the commit HEAD points to.
pub fn head_commit(path: &Path) -> Result<String, GitError> {
    let repo = open_repository(path)?;
    let head = repo
        .head()
        .and_then(|h| h.peel_to_commit())
        .map_err(|_| GitError::NoHead(path.to_path_buf()))?;
    Ok(head.id().to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use anyhow::Result;
    use git2::{Repository, Signature, Time};
    use std::path::Path;

    /// Commit `files` (path, content) as `name <email>` at `epoch` seconds
    /// with the given UTC offset in minutes.
    pub fn commit_files(
        repo: &Repository,
        files: &[(&str, &str)],
        name: &str,
        email: &str,
        epoch: i64,
        offset_minutes: i32,
    ) -> Result<git2::Oid> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| anyhow::anyhow!("bare repository"))?
            .to_path_buf();
        let mut index = repo.index()?;
        for (path, content) in files {
            let full = workdir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&full, content)?;
            index.add_path(Path::new(path))?;
        }
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let sig = Signature::new(name, email, &Time::new(epoch, offset_minutes))?;
        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit()?],
            Err(_) => Vec::new(),
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        Ok(repo.commit(Some("HEAD"), &sig, &sig, "change", &tree, &parent_refs)?)
    }

    pub fn init_repo(path: &Path) -> Result<Repository> {
        let repo = Repository::init(path)?;
        let mut config = repo.config()?;
        config.set_str("user.name", "Test User")?;
        config.set_str("user.email", "test@example.com")?;
        drop(config);
        Ok(repo)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_open_repository_errors() -> Result<()> {
        let missing = open_repository(Path::new("/no/such/repo")).err().unwrap();
        assert!(matches!(missing, GitError::Missing(_)));

        let plain = tempdir()?;
        let err = open_repository(plain.path()).err().unwrap();
        assert!(matches!(err, GitError::NotARepository { .. }));
        Ok(())
    }

    #[test]
    fn test_head_commit() -> Result<()> {
        let dir = tempdir()?;
        let repo = init_repo(dir.path())?;
        assert!(matches!(head_commit(dir.path()), Err(GitError::NoHead(_))));

        let oid = commit_files(&repo, &[("a.txt", "a\n")], "A", "a@x.com", 1_700_000_000, 0)?;
        assert_eq!(head_commit(dir.path())?, oid.to_string());
        Ok(())
    }
}
