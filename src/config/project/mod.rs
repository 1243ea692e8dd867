//! Configuration directory loading
//!
//! Reads every input of a run from one directory (default `configuration/`).
//! All files are optional; a missing file means "nothing configured".
//!
//! # Configuration Format
//!
//! ```toml
//! # gitcensus.toml
//!
//! [settings]
//! repos_root = "repos"
//! workers = 4
//! dead_threshold_months = 3
//!
//! [[repos]]
//! name = "acme/core"          # path defaults to <repos_root>/acme/core
//!
//! [[repos]]
//! name = "tools"
//! path = "/srv/git/tools"
//! ```
//!
//! ```json
//! // services.json
//! { "acme/core": { "billing": ["billing/"], "main": "" } }
//! // teams.json
//! { "payments": { "name": "Payments", "description": "", "members": ["jdoe"] } }
//! // alias.json
//! { "jdoe": ["John Doe <john@x.com>", "jd@old.example"] }
//! // team_subsystem_responsibilities.json
//! { "payments": ["billing"] }
//! ```

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::discover::discover_repositories;
use super::settings::{Settings, SettingsFile, SettingsOverrides};
use super::{ConfigError, ConfigErrors, ConfigWarning};
use crate::identity::{AliasTable, IgnoreList};
use crate::subsystem::{SubsystemConfig, SubsystemMapper};
use crate::teams::TeamDirectory;

pub const SETTINGS_FILE: &str = "gitcensus.toml";
pub const SERVICES_FILE: &str = "services.json";
pub const TEAMS_FILE: &str = "teams.json";
pub const ALIAS_FILE: &str = "alias.json";
pub const IGNORE_FILE: &str = "ignore_user.txt";
pub const RESPONSIBILITIES_FILE: &str = "team_subsystem_responsibilities.json";

/// A repository to process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSpec {
    /// Name used in reports and in `services.json`
    pub name: String,
    /// Working tree location
    pub path: PathBuf,
}

/// One entry of `teams.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TeamEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectFile {
    #[serde(default)]
    settings: Option<SettingsFile>,
    #[serde(default)]
    repos: Vec<RepoEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RepoEntry {
    name: String,
    #[serde(default)]
    path: Option<PathBuf>,
}

/// `services.json` accepts a single prefix or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PrefixList {
    One(String),
    Many(Vec<String>),
}

impl PrefixList {
    fn into_vec(self) -> Vec<String> {
        match self {
            PrefixList::One(p) => vec![p],
            PrefixList::Many(ps) => ps,
        }
    }
}

/// Fully validated configuration for one run.
#[derive(Debug, Clone)]
pub struct CensusConfig {
    pub config_dir: PathBuf,
    pub settings: Settings,
    pub repos: Vec<RepoSpec>,
    pub identities: AliasTable,
    pub subsystems: SubsystemMapper,
    pub teams: TeamDirectory,
    pub warnings: Vec<ConfigWarning>,
}

/// Load and validate the configuration directory.
///
/// Every problem across every file is collected; the caller gets either a
/// complete configuration or the full list of errors.
pub fn load_config(dir: &Path, overrides: &SettingsOverrides) -> Result<CensusConfig, ConfigErrors> {
    if !dir.is_dir() {
        return Err(ConfigError::MissingDirectory(dir.to_path_buf()).into());
    }

    let mut errors: Vec<ConfigError> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    let project: ProjectFile = read_optional(&dir.join(SETTINGS_FILE), parse_toml, &mut errors)
        .unwrap_or_default();

    let mut settings = match Settings::resolve(project.settings) {
        Ok(s) => s,
        Err(e) => {
            errors.push(e);
            Settings::default()
        }
    };
    settings.apply_overrides(overrides);
    errors.extend(settings.validate());

    let repos = resolve_repos(project.repos, &settings, &mut errors);

    let aliases: IndexMap<String, Vec<String>> =
        read_optional(&dir.join(ALIAS_FILE), parse_json, &mut errors).unwrap_or_default();
    let ignored = read_optional(&dir.join(IGNORE_FILE), |_, text| Ok(IgnoreList::parse(text)), &mut errors)
        .unwrap_or_default();
    let identities = AliasTable::build(&aliases, ignored).unwrap_or_else(|e| {
        errors.extend(e);
        AliasTable::default()
    });

    let services: IndexMap<String, IndexMap<String, PrefixList>> =
        read_optional(&dir.join(SERVICES_FILE), parse_json, &mut errors).unwrap_or_default();
    let services: SubsystemConfig = services
        .into_iter()
        .map(|(repo, subs)| {
            let subs = subs.into_iter().map(|(name, p)| (name, p.into_vec())).collect();
            (repo, subs)
        })
        .collect();
    let subsystems = match SubsystemMapper::from_config(&services) {
        Ok((mapper, w)) => {
            warnings.extend(w);
            mapper
        }
        Err(e) => {
            errors.extend(e);
            SubsystemMapper::new()
        }
    };

    let team_entries: IndexMap<String, TeamEntry> =
        read_optional(&dir.join(TEAMS_FILE), parse_json, &mut errors).unwrap_or_default();
    let responsibilities: IndexMap<String, Vec<String>> =
        read_optional(&dir.join(RESPONSIBILITIES_FILE), parse_json, &mut errors)
            .unwrap_or_default();
    let teams = match TeamDirectory::build(&team_entries, &responsibilities, &identities, &subsystems) {
        Ok((directory, w)) => {
            warnings.extend(w);
            directory
        }
        Err(e) => {
            errors.extend(e);
            TeamDirectory::new()
        }
    };

    if !errors.is_empty() {
        return Err(ConfigErrors(errors));
    }

    for w in &warnings {
        warn!("{}", w);
    }
    debug!(
        "Loaded configuration from {}: {} repos, {} identities, {} teams",
        dir.display(),
        repos.len(),
        identities.identities().count(),
        teams.len()
    );

    Ok(CensusConfig {
        config_dir: dir.to_path_buf(),
        settings,
        repos,
        identities,
        subsystems,
        teams,
        warnings,
    })
}

/// Declared repositories, or everything found under `repos_root`.
fn resolve_repos(
    declared: Vec<RepoEntry>,
    settings: &Settings,
    errors: &mut Vec<ConfigError>,
) -> Vec<RepoSpec> {
    if declared.is_empty() {
        return discover_repositories(&settings.repos_root);
    }

    let mut seen = HashSet::new();
    let mut repos = Vec::with_capacity(declared.len());
    for entry in declared {
        let name = entry.name.trim().trim_matches('/').to_string();
        if !seen.insert(name.clone()) {
            errors.push(ConfigError::DuplicateRepository { name });
            continue;
        }
        let path = settings.repo_path(entry.path.as_deref().unwrap_or_else(|| Path::new(&name)));
        repos.push(RepoSpec { name, path });
    }
    repos
}

/// Read and parse `path` if it exists, recording failures in `errors`.
fn read_optional<T>(
    path: &Path,
    parse: impl FnOnce(&Path, &str) -> Result<T, ConfigError>,
    errors: &mut Vec<ConfigError>,
) -> Option<T> {
    if !path.exists() {
        debug!("{} not present, skipping", path.display());
        return None;
    }
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(source) => {
            errors.push(ConfigError::Unreadable {
                path: path.to_path_buf(),
                source,
            });
            return None;
        }
    };
    match parse(path, &text) {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

fn parse_json<T: DeserializeOwned>(path: &Path, text: &str) -> Result<T, ConfigError> {
    if text.trim().is_empty() {
        return serde_json::from_str("{}").map_err(|e| malformed(path, e));
    }
    serde_json::from_str(text).map_err(|e| malformed(path, e))
}

fn parse_toml<T: DeserializeOwned>(path: &Path, text: &str) -> Result<T, ConfigError> {
    toml::from_str(text).map_err(|e| malformed(path, e))
}

fn malformed(path: &Path, e: impl std::fmt::Display) -> ConfigError {
    ConfigError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}
