//! Configuration module for gitcensus
//!
//! This module handles:
//! - Run settings (`gitcensus.toml`, user config, environment)
//! - Repository list (declared or discovered under `repos_root`)
//! - Identity, subsystem and team inputs (JSON files and the ignore list)
//!
//! Everything is validated once at load time. Errors are collected across
//! all files and reported together; the run never starts on an ambiguous
//! configuration.

mod discover;
mod project;
mod settings;

pub use discover::discover_repositories;
pub use project::{load_config, CensusConfig, RepoSpec, TeamEntry};
pub use settings::{default_workers, Settings, SettingsOverrides};

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A configuration problem that prevents a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("raw identifier '{raw}' is mapped to both '{first}' and '{second}'")]
    DuplicateAlias {
        raw: String,
        first: String,
        second: String,
    },

    #[error("repository '{repo}', subsystem '{subsystem}': invalid prefix '{prefix}' ({reason})")]
    InvalidPrefix {
        repo: String,
        subsystem: String,
        prefix: String,
        reason: String,
    },

    #[error("repository '{repo}' declares a subsystem with an empty name")]
    EmptySubsystemName { repo: String },

    #[error("repository '{name}' is listed more than once")]
    DuplicateRepository { name: String },

    #[error("team responsibilities reference unknown team '{team}'")]
    UnknownTeam { team: String },

    #[error("invalid setting '{key}': {message}")]
    InvalidSetting { key: String, message: String },
}

/// A configuration oddity that is reported but does not stop the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigWarning {
    #[error("repository '{repo}': prefix '{prefix}' is declared by both '{kept}' and '{shadowed}'; '{kept}' wins")]
    DuplicatePrefix {
        repo: String,
        prefix: String,
        kept: String,
        shadowed: String,
    },

    #[error("team '{team}' is responsible for unknown subsystem '{subsystem}'")]
    UnknownSubsystem { team: String, subsystem: String },

    #[error("team '{team}' lists member '{member}', which is an alias of '{canonical}'")]
    MemberIsAlias {
        team: String,
        member: String,
        canonical: String,
    },
}

/// All configuration errors found while loading.
#[derive(Debug, Error)]
pub struct ConfigErrors(pub Vec<ConfigError>);

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} configuration error(s)", self.0.len())?;
        for e in &self.0 {
            write!(f, "\n  - {}", e)?;
        }
        Ok(())
    }
}

impl From<ConfigError> for ConfigErrors {
    fn from(e: ConfigError) -> Self {
        ConfigErrors(vec![e])
    }
}
