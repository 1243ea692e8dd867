//! Run settings for gitcensus
//!
//! Supports loading settings from (lowest to highest priority):
//! - Built-in defaults
//! - ~/.config/gitcensus/config.toml
//! - `<config dir>/gitcensus.toml`
//! - Environment variables (`GITCENSUS_*`)
//! - Command-line flags

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::ConfigError;

/// Default pool size: 4 workers, 6 on machines with at least 8 cores.
pub fn default_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    if cores >= 8 {
        6
    } else {
        4
    }
}

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    /// Root under which repositories are discovered when none are listed
    pub repos_root: PathBuf,
    /// Root under which `stats/` snapshots are written
    pub output_root: PathBuf,
    /// Bounded worker pool size
    pub workers: usize,
    /// Per git invocation timeout
    pub git_timeout_secs: u64,
    /// Per cloc invocation timeout
    pub cloc_timeout_secs: u64,
    /// Delay before the single retry of a failed subprocess
    pub retry_backoff_ms: u64,
    /// Ceiling for the whole run
    pub job_timeout_secs: u64,
    /// Months without commits before a subsystem counts as dead
    pub dead_threshold_months: u32,
    /// Rolling window for the top maintainer badge
    pub maintainer_window_months: u32,
    /// Run cloc for language breakdowns
    pub languages: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repos_root: PathBuf::from("repos"),
            output_root: PathBuf::from("."),
            workers: default_workers(),
            git_timeout_secs: 300,
            cloc_timeout_secs: 300,
            retry_backoff_ms: 500,
            job_timeout_secs: 6 * 60 * 60,
            dead_threshold_months: 3,
            maintainer_window_months: 3,
            languages: true,
        }
    }
}

/// The `[settings]` table as written on disk: every key optional.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsFile {
    pub repos_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub workers: Option<usize>,
    pub git_timeout_secs: Option<u64>,
    pub cloc_timeout_secs: Option<u64>,
    pub retry_backoff_ms: Option<u64>,
    pub job_timeout_secs: Option<u64>,
    pub dead_threshold_months: Option<u32>,
    pub maintainer_window_months: Option<u32>,
    pub languages: Option<bool>,
}

/// Values supplied on the command line.
#[derive(Debug, Default, Clone)]
pub struct SettingsOverrides {
    pub repos_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub workers: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    settings: SettingsFile,
}

impl Settings {
    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gitcensus").join("config.toml"))
    }

    /// Layer the user config under `project` and apply environment overrides.
    pub(crate) fn resolve(project: Option<SettingsFile>) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();

        if let Some(user) = Self::user_config_path()
            .filter(|p| p.exists())
            .and_then(|p| std::fs::read_to_string(&p).ok())
            .and_then(|content| toml::from_str::<UserConfig>(&content).ok())
        {
            debug!("Applying user config");
            settings.merge(user.settings);
        }

        if let Some(project) = project {
            settings.merge(project);
        }

        settings.apply_env()?;
        Ok(settings)
    }

    /// Merge a settings table into this one (other takes priority)
    pub(crate) fn merge(&mut self, other: SettingsFile) {
        if let Some(v) = other.repos_root {
            self.repos_root = v;
        }
        if let Some(v) = other.output_root {
            self.output_root = v;
        }
        if let Some(v) = other.workers {
            self.workers = v;
        }
        if let Some(v) = other.git_timeout_secs {
            self.git_timeout_secs = v;
        }
        if let Some(v) = other.cloc_timeout_secs {
            self.cloc_timeout_secs = v;
        }
        if let Some(v) = other.retry_backoff_ms {
            self.retry_backoff_ms = v;
        }
        if let Some(v) = other.job_timeout_secs {
            self.job_timeout_secs = v;
        }
        if let Some(v) = other.dead_threshold_months {
            self.dead_threshold_months = v;
        }
        if let Some(v) = other.maintainer_window_months {
            self.maintainer_window_months = v;
        }
        if let Some(v) = other.languages {
            self.languages = v;
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(root) = std::env::var("GITCENSUS_REPOS_ROOT") {
            self.repos_root = PathBuf::from(root);
        }
        if let Ok(root) = std::env::var("GITCENSUS_OUTPUT_ROOT") {
            self.output_root = PathBuf::from(root);
        }
        if let Ok(workers) = std::env::var("GITCENSUS_WORKERS") {
            self.workers = workers.trim().parse().map_err(|_| ConfigError::InvalidSetting {
                key: "GITCENSUS_WORKERS".to_string(),
                message: format!("'{}' is not a number", workers),
            })?;
        }
        Ok(())
    }

    /// Command-line values win over everything else.
    pub fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(root) = &overrides.repos_root {
            self.repos_root = root.clone();
        }
        if let Some(root) = &overrides.output_root {
            self.output_root = root.clone();
        }
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
    }

    /// Range checks, collected rather than failing on the first.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut bad = |key: &str, message: &str| {
            errors.push(ConfigError::InvalidSetting {
                key: key.to_string(),
                message: message.to_string(),
            })
        };
        if self.workers == 0 || self.workers > 64 {
            bad("workers", "must be between 1 and 64");
        }
        if self.git_timeout_secs == 0 {
            bad("git_timeout_secs", "must be positive");
        }
        if self.cloc_timeout_secs == 0 {
            bad("cloc_timeout_secs", "must be positive");
        }
        if self.job_timeout_secs < self.git_timeout_secs {
            bad("job_timeout_secs", "must be at least git_timeout_secs");
        }
        if self.dead_threshold_months == 0 {
            bad("dead_threshold_months", "must be at least 1");
        }
        if self.maintainer_window_months == 0 {
            bad("maintainer_window_months", "must be at least 1");
        }
        errors
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn cloc_timeout(&self) -> Duration {
        Duration::from_secs(self.cloc_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Root of the snapshot tree.
    pub fn stats_root(&self) -> PathBuf {
        self.output_root.join("stats")
    }

    /// Resolve a repository path relative to `repos_root`.
    pub fn repo_path(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.repos_root.join(relative)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.workers == 4 || settings.workers == 6);
        assert_eq!(settings.dead_threshold_months, 3);
        assert_eq!(settings.git_timeout(), Duration::from_secs(300));
        assert!(settings.languages);
        assert!(settings.validate().is_empty());
    }

    #[test]
    fn test_merge_only_overrides_present_keys() {
        let mut settings = Settings::default();
        let file: SettingsFile = toml::from_str(
            r#"
workers = 2
dead_threshold_months = 6
languages = false
"#,
        )
        .unwrap();
        settings.merge(file);
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.dead_threshold_months, 6);
        assert!(!settings.languages);
        assert_eq!(settings.git_timeout_secs, 300);
    }

    #[test]
    fn test_unknown_setting_is_rejected() {
        assert!(toml::from_str::<SettingsFile>("wrokers = 2").is_err());
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let settings = Settings {
            workers: 0,
            dead_threshold_months: 0,
            ..Settings::default()
        };
        assert_eq!(settings.validate().len(), 2);
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut settings = Settings::default();
        settings.apply_overrides(&SettingsOverrides {
            workers: Some(3),
            output_root: Some(PathBuf::from("/tmp/out")),
            ..Default::default()
        });
        assert_eq!(settings.workers, 3);
        assert_eq!(settings.stats_root(), PathBuf::from("/tmp/out/stats"));
    }
}
