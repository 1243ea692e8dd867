//! Path-to-subsystem mapping
//!
//! Each repository declares `subsystem -> [path prefixes]`. A file belongs to
//! the subsystem with the longest matching prefix; the empty prefix is the
//! catch-all. Repositories without configuration form a single implicit
//! subsystem named after the repository.

use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

use crate::config::{ConfigError, ConfigWarning};

/// `repo -> subsystem -> prefixes`, in declaration order.
pub type SubsystemConfig = IndexMap<String, IndexMap<String, Vec<String>>>;

/// Normalize a repository-relative path: `/` separators, no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let mut p = path.replace('\\', "/");
    while let Some(rest) = p.strip_prefix("./") {
        p = rest.to_string();
    }
    p
}

/// Implicit subsystem name for an unconfigured repository: its last path segment.
pub fn default_subsystem(repo: &str) -> String {
    repo.trim_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown-subsystem")
        .to_string()
}

/// Normalize a configured prefix. `""` and `"."` are the catch-all; any other
/// prefix matches a directory and gets a trailing `/`.
fn normalize_prefix(raw: &str) -> Result<String, &'static str> {
    let p = normalize_path(raw.trim());
    if p.is_empty() || p == "." {
        return Ok(String::new());
    }
    if p.starts_with('/') {
        return Err("absolute paths are not allowed");
    }
    if p.split('/').any(|seg| seg == "..") {
        return Err("'..' segments are not allowed");
    }
    if p.ends_with('/') {
        Ok(p)
    } else {
        Ok(format!("{}/", p))
    }
}

#[derive(Debug, Clone)]
struct PrefixRule {
    subsystem: String,
    prefix: String,
}

/// Rules of one repository, longest prefix first, ties in declaration order.
#[derive(Debug, Clone, Default)]
struct RepoRules {
    rules: Vec<PrefixRule>,
}

impl RepoRules {
    fn matching(&self, path: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| path.starts_with(&r.prefix))
            .map(|r| r.subsystem.as_str())
    }
}

/// Longest-prefix subsystem lookup for every configured repository.
#[derive(Debug, Clone, Default)]
pub struct SubsystemMapper {
    repos: HashMap<String, RepoRules>,
}

impl SubsystemMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration, collecting malformed prefixes as errors and
    /// equal prefixes across subsystems as warnings (first declared wins).
    pub fn from_config(
        config: &SubsystemConfig,
    ) -> Result<(Self, Vec<ConfigWarning>), Vec<ConfigError>> {
        let mut mapper = SubsystemMapper::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for (repo, subsystems) in config {
            let mut rules: Vec<PrefixRule> = Vec::new();
            for (subsystem, prefixes) in subsystems {
                if subsystem.trim().is_empty() {
                    errors.push(ConfigError::EmptySubsystemName { repo: repo.clone() });
                    continue;
                }
                for raw in prefixes {
                    let prefix = match normalize_prefix(raw) {
                        Ok(p) => p,
                        Err(reason) => {
                            errors.push(ConfigError::InvalidPrefix {
                                repo: repo.clone(),
                                subsystem: subsystem.clone(),
                                prefix: raw.clone(),
                                reason: reason.to_string(),
                            });
                            continue;
                        }
                    };
                    match rules.iter().find(|r| r.prefix == prefix) {
                        Some(existing) if existing.subsystem != *subsystem => {
                            warnings.push(ConfigWarning::DuplicatePrefix {
                                repo: repo.clone(),
                                prefix: raw.clone(),
                                kept: existing.subsystem.clone(),
                                shadowed: subsystem.clone(),
                            });
                        }
                        Some(_) => {}
                        None => rules.push(PrefixRule {
                            subsystem: subsystem.clone(),
                            prefix,
                        }),
                    }
                }
            }
            // Stable: equal lengths keep declaration order.
            rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
            mapper.repos.insert(repo.clone(), RepoRules { rules });
        }

        if errors.is_empty() {
            Ok((mapper, warnings))
        } else {
            Err(errors)
        }
    }

    /// Subsystem of `path` inside `repo`.
    pub fn map(&self, repo: &str, path: &str) -> String {
        let path = normalize_path(path);
        self.repos
            .get(repo)
            .and_then(|rules| rules.matching(&path))
            .map(str::to_string)
            .unwrap_or_else(|| default_subsystem(repo))
    }

    pub fn is_configured(&self, repo: &str) -> bool {
        self.repos.contains_key(repo)
    }

    /// Every subsystem name declared in configuration.
    pub fn configured_subsystems(&self) -> BTreeSet<String> {
        self.repos
            .values()
            .flat_map(|r| r.rules.iter().map(|rule| rule.subsystem.clone()))
            .collect()
    }

    /// Subsystems a repository can produce, including the implicit one.
    pub fn subsystems_of(&self, repo: &str) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .repos
            .get(repo)
            .map(|r| r.rules.iter().map(|rule| rule.subsystem.clone()).collect())
            .unwrap_or_default();
        let has_catch_all = self
            .repos
            .get(repo)
            .is_some_and(|r| r.rules.iter().any(|rule| rule.prefix.is_empty()));
        if !has_catch_all {
            names.insert(default_subsystem(repo));
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(entries: &[(&str, &[(&str, &[&str])])]) -> SubsystemConfig {
        entries
            .iter()
            .map(|(repo, subs)| {
                let subs = subs
                    .iter()
                    .map(|(name, prefixes)| {
                        (name.to_string(), prefixes.iter().map(|p| p.to_string()).collect())
                    })
                    .collect();
                (repo.to_string(), subs)
            })
            .collect()
    }

    #[test]
    fn test_longest_prefix_wins() {
        let cfg = config(&[(
            "acme/core",
            &[
                ("main", &[""]),
                ("billing", &["billing/"]),
                ("invoices", &["billing/invoices"]),
            ],
        )]);
        let (mapper, warnings) = SubsystemMapper::from_config(&cfg).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(mapper.map("acme/core", "billing/x.py"), "billing");
        assert_eq!(mapper.map("acme/core", "billing/invoices/pdf.py"), "invoices");
        assert_eq!(mapper.map("acme/core", "README.md"), "main");
        assert_eq!(mapper.map("acme/core", "./billing/x.py"), "billing");
        assert_eq!(mapper.map("acme/core", "billing\\x.py"), "billing");
    }

    #[test]
    fn test_prefix_matches_directories_only() {
        let cfg = config(&[("r", &[("api", &["api"]), ("main", &["."])])]);
        let (mapper, _) = SubsystemMapper::from_config(&cfg).unwrap();
        assert_eq!(mapper.map("r", "api/handler.go"), "api");
        assert_eq!(mapper.map("r", "apidocs/index.md"), "main");
    }

    #[test]
    fn test_unconfigured_repo_is_one_subsystem() {
        let mapper = SubsystemMapper::new();
        assert_eq!(mapper.map("acme/payments", "src/lib.rs"), "payments");
        assert_eq!(default_subsystem("solo/"), "solo");
    }

    #[test]
    fn test_configured_repo_without_catch_all_falls_back_to_repo_name() {
        let cfg = config(&[("acme/core", &[("billing", &["billing/"])])]);
        let (mapper, _) = SubsystemMapper::from_config(&cfg).unwrap();
        assert_eq!(mapper.map("acme/core", "docs/a.md"), "core");
        assert!(mapper.subsystems_of("acme/core").contains("core"));
    }

    #[test]
    fn test_duplicate_prefix_first_declared_wins_with_warning() {
        let cfg = config(&[("r", &[("alpha", &["shared/"]), ("beta", &["shared"])])]);
        let (mapper, warnings) = SubsystemMapper::from_config(&cfg).unwrap();
        assert_eq!(mapper.map("r", "shared/file.txt"), "alpha");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].to_string().contains("'alpha' wins"));
    }

    #[test]
    fn test_malformed_prefixes_are_collected() {
        let cfg = config(&[("r", &[("abs", &["/etc"]), ("up", &["../x"]), ("", &["y/"])])]);
        let errors = SubsystemMapper::from_config(&cfg).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_configured_subsystems() {
        let cfg = config(&[
            ("a", &[("billing", &["billing/"]), ("main", &[""])]),
            ("b", &[("billing", &["pkg/billing/"])]),
        ]);
        let (mapper, _) = SubsystemMapper::from_config(&cfg).unwrap();
        let names: Vec<String> = mapper.configured_subsystems().into_iter().collect();
        assert_eq!(names, vec!["billing", "main"]);
        assert_eq!(mapper.map("b", "pkg/billing/a.go"), "billing");
    }
}
