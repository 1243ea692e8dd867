//! What a run did, including everything it could not do.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::period::Month;

/// A unit of work that was given up on after its retry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum Unit {
    History { repo: String, month: Month },
    /// `file` is `None` when the whole repository could not be blamed
    Blame { repo: String, file: Option<String> },
    Languages { repo: String },
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::History { repo, month } => write!(f, "history {} {}", repo, month),
            Unit::Blame { repo, file: Some(file) } => write!(f, "blame {}:{}", repo, file),
            Unit::Blame { repo, file: None } => write!(f, "blame {}", repo),
            Unit::Languages { repo } => write!(f, "languages {}", repo),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SkippedUnit {
    #[serde(flatten)]
    pub unit: Unit,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedRepo {
    pub repo: String,
    pub reason: String,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub months: Vec<Month>,
    pub processed: Vec<String>,
    pub excluded: Vec<ExcludedRepo>,
    pub skipped: Vec<SkippedUnit>,
    pub warnings: Vec<String>,
    pub commits_folded: u64,
    pub commits_ignored: u64,
    /// Snapshot writes that changed the stored bytes
    pub written: usize,
    /// Snapshot writes identical to what was stored
    pub unchanged: usize,
    /// Stored snapshots this run no longer produces, deleted
    pub removed: usize,
    pub ownership_records: usize,
    pub cancelled: bool,
    pub timed_out: bool,
}

impl RunReport {
    pub(crate) fn start(dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            dry_run,
            months: Vec::new(),
            processed: Vec::new(),
            excluded: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
            commits_folded: 0,
            commits_ignored: 0,
            written: 0,
            unchanged: 0,
            removed: 0,
            ownership_records: 0,
            cancelled: false,
            timed_out: false,
        }
    }

    pub(crate) fn skip(&mut self, unit: Unit, reason: impl fmt::Display) {
        self.skipped.push(SkippedUnit {
            unit,
            reason: reason.to_string(),
        });
    }

    /// True when every unit of work finished.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && !self.timed_out && self.skipped.is_empty() && self.excluded.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} repositories", self.processed.len()),
            format!("{} months", self.months.len()),
            format!("{} commits", self.commits_folded),
            format!("{} written", self.written),
            format!("{} unchanged", self.unchanged),
        ];
        if self.removed > 0 {
            parts.push(format!("{} removed", self.removed));
        }
        if self.commits_ignored > 0 {
            parts.push(format!("{} ignored commits", self.commits_ignored));
        }
        if !self.excluded.is_empty() {
            parts.push(format!("{} excluded", self.excluded.len()));
        }
        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped units", self.skipped.len()));
        }
        if self.cancelled {
            parts.push("cancelled".to_string());
        }
        if self.timed_out {
            parts.push("timed out".to_string());
        }
        parts.join(", ")
    }
}
