//! Commit history extraction
//!
//! Runs one `git log --numstat` per repository and calendar month and parses
//! it into [`Commit`] records. Merges are excluded; author dates keep the
//! author's UTC offset.

use chrono::DateTime;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::GitOptions;
use crate::exec::ProcessError;
use crate::models::{Commit, FileChange, RawAuthor};
use crate::period::Month;
use crate::subsystem::normalize_path;

const FIELD_SEP: char = '\x01';
const COMMIT_MARK: char = '\x02';

/// Extracts commits from one repository.
#[derive(Debug, Clone)]
pub struct HistoryExtractor {
    name: String,
    path: PathBuf,
    options: GitOptions,
}

impl HistoryExtractor {
    pub fn new(name: &str, path: &Path, options: GitOptions) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            options,
        }
    }

    pub fn repo_name(&self) -> &str {
        &self.name
    }

    /// Non-merge commits in `month` on the checked-out branch.
    pub fn extract_month(&self, month: Month) -> Result<Vec<Commit>, ProcessError> {
        let since = format!("--since={} 00:00:00 +0000", month.first_day());
        let until = format!("--until={} 23:59:59 +0000", month.last_day());
        let output = self
            .options
            .command(&self.path)
            .args([
                "log",
                "--no-merges",
                "--numstat",
                "--no-color",
                "--pretty=format:%x02%H%x01%an%x01%ae%x01%aI",
            ])
            .arg(since)
            .arg(until)
            .run()?;

        let commits = parse_log(&self.name, month, &output.stdout_lossy());
        debug!("{} {}: {} commits", self.name, month, commits.len());
        Ok(commits)
    }

    /// Every month in `[from, to]`. Months that fail are returned separately
    /// so the caller can report them.
    pub fn extract(&self, from: Month, to: Month) -> (Vec<Commit>, Vec<(Month, ProcessError)>) {
        let mut commits = Vec::new();
        let mut failed = Vec::new();
        for month in Month::range(from, to) {
            match self.extract_month(month) {
                Ok(mut c) => commits.append(&mut c),
                Err(e) => {
                    warn!("history of {} for {} skipped: {}", self.name, month, e);
                    failed.push((month, e));
                }
            }
        }
        (commits, failed)
    }
}

/// Parse `git log` output produced with the extractor's format.
///
/// Each commit starts with a `\x02`-prefixed header of `\x01`-separated
/// fields (`sha`, `name`, `email`, `author date`), followed by numstat lines
/// `additions<TAB>deletions<TAB>path`. Binary files report `-` for both
/// counts.
pub fn parse_log(repo: &str, month: Month, text: &str) -> Vec<Commit> {
    let mut commits: Vec<Commit> = Vec::new();

    for line in text.lines() {
        if let Some(header) = line.strip_prefix(COMMIT_MARK) {
            let fields: Vec<&str> = header.split(FIELD_SEP).collect();
            if fields.len() != 4 {
                warn!("{}: unparseable commit header {:?}", repo, header);
                continue;
            }
            let Ok(timestamp) = DateTime::parse_from_rfc3339(fields[3].trim()) else {
                warn!("{}: bad author date {:?} in {}", repo, fields[3], fields[0]);
                continue;
            };
            commits.push(Commit {
                repo: repo.to_string(),
                sha: fields[0].to_string(),
                author: RawAuthor::new(fields[1], fields[2]),
                timestamp,
                month,
                files: Vec::new(),
            });
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }
        let Some(commit) = commits.last_mut() else {
            continue;
        };
        if let Some(change) = parse_numstat(line) {
            commit.files.push(change);
        }
    }

    commits
}

fn parse_numstat(line: &str) -> Option<FileChange> {
    let mut parts = line.splitn(3, '\t');
    let added = parts.next()?;
    let deleted = parts.next()?;
    let path = resolve_rename(parts.next()?);
    if path.is_empty() {
        return None;
    }
    if added == "-" || deleted == "-" {
        return Some(FileChange::binary(path));
    }
    Some(FileChange::lines(
        path,
        added.trim().parse().ok()?,
        deleted.trim().parse().ok()?,
    ))
}

/// Resolve numstat rename notation to the new path.
///
/// `old => new` becomes `new`; `dir/{old => new}/file` becomes
/// `dir/new/file`; an empty side collapses its slash.
pub fn resolve_rename(path: &str) -> String {
    let path = path.trim();
    if let (Some(open), Some(close)) = (path.find('{'), path.rfind('}')) {
        if open < close {
            let inner = &path[open + 1..close];
            if let Some((_, new)) = inner.split_once(" => ") {
                let joined = format!("{}{}{}", &path[..open], new, &path[close + 1..]);
                return normalize_path(&joined.replace("//", "/"));
            }
        }
    }
    match path.split_once(" => ") {
        Some((_, new)) => normalize_path(new),
        None => normalize_path(path),
    }
}
