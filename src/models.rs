//! Core data models for gitcensus
//!
//! These models are shared by the extractors, the engines and the
//! snapshot store.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::period::Month;

/// Author identity exactly as recorded by git.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct RawAuthor {
    pub name: String,
    pub email: String,
}

impl RawAuthor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// The `Name <email>` form used in git output and alias tables.
    pub fn identifier(&self) -> String {
        if self.email.is_empty() {
            self.name.clone()
        } else {
            format!("{} <{}>", self.name, self.email)
        }
    }
}

impl fmt::Display for RawAuthor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

/// One file's line counts within a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub additions: u64,
    pub deletions: u64,
    /// Git reported `-` for this file: the change exists but has no line counts.
    #[serde(default)]
    pub binary: bool,
}

impl FileChange {
    pub fn lines(path: impl Into<String>, additions: u64, deletions: u64) -> Self {
        Self {
            path: path.into(),
            additions,
            deletions,
            binary: false,
        }
    }

    pub fn binary(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            additions: 0,
            deletions: 0,
            binary: true,
        }
    }

    /// Whether this entry attributes any activity to its path.
    pub fn is_touch(&self) -> bool {
        self.binary || self.additions > 0 || self.deletions > 0
    }
}

/// A non-merge commit parsed from `git log --numstat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub repo: String,
    pub sha: String,
    pub author: RawAuthor,
    /// Author date in the author's recorded timezone.
    pub timestamp: DateTime<FixedOffset>,
    /// Extraction window this commit was reported in.
    pub month: Month,
    pub files: Vec<FileChange>,
}

impl Commit {
    /// Author-local calendar date.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// The kind of entity an aggregate describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Developer,
    Team,
    Subsystem,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Developer, EntityKind::Team, EntityKind::Subsystem];

    /// Directory name under `stats/`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntityKind::Developer => "developers",
            EntityKind::Team => "teams",
            EntityKind::Subsystem => "subsystems",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Developer => write!(f, "developer"),
            EntityKind::Team => write!(f, "team"),
            EntityKind::Subsystem => write!(f, "subsystem"),
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "developer" | "developers" | "dev" | "user" => Ok(EntityKind::Developer),
            "team" | "teams" => Ok(EntityKind::Team),
            "subsystem" | "subsystems" | "service" => Ok(EntityKind::Subsystem),
            other => Err(format!("unknown entity kind '{}'", other)),
        }
    }
}

/// Lines currently attributed to one raw author in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameCount {
    pub path: String,
    pub author: RawAuthor,
    pub lines: u64,
}

/// Blame attribution for a whole repository at its current HEAD.
#[derive(Debug, Clone, Default)]
pub struct RepoBlame {
    pub repo: String,
    /// HEAD commit id the blame was taken at.
    pub head: String,
    pub counts: Vec<BlameCount>,
}
