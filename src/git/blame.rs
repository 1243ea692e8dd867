//! Blame extraction at HEAD
//!
//! Counts, for every tracked text file, how many lines each raw author
//! currently owns. Files are blamed in parallel on the current rayon pool;
//! a file that fails is skipped and reported, never fatal.

use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

use super::{head_commit, GitError, GitOptions};
use crate::exec::ProcessError;
use crate::models::{BlameCount, RawAuthor, RepoBlame};
use crate::pipeline::CancelToken;

/// Git's own binary heuristic looks at this many leading bytes.
const BINARY_SNIFF_LEN: usize = 8000;

/// Blame of a whole repository plus the files that could not be blamed.
#[derive(Debug, Default)]
pub struct BlameOutcome {
    pub blame: RepoBlame,
    /// (path, reason)
    pub skipped: Vec<(String, String)>,
    pub files_blamed: usize,
}

/// Blames every tracked file of one repository.
#[derive(Debug, Clone)]
pub struct BlameExtractor {
    name: String,
    path: PathBuf,
    options: GitOptions,
}

impl BlameExtractor {
    pub fn new(name: &str, path: &Path, options: GitOptions) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            options,
        }
    }

    /// Tracked files, as reported by `git ls-files -z`.
    pub fn tracked_files(&self) -> Result<Vec<String>, ProcessError> {
        let output = self.options.command(&self.path).args(["ls-files", "-z"]).run()?;
        Ok(output
            .stdout
            .split(|b| *b == 0)
            .filter(|p| !p.is_empty())
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect())
    }

    /// Lines per raw author in one file at HEAD.
    pub fn blame_file(&self, file: &str) -> Result<Vec<(RawAuthor, u64)>, ProcessError> {
        let output = self
            .options
            .command(&self.path)
            .args(["blame", "--line-porcelain", "HEAD", "--", file])
            .run()?;
        Ok(parse_line_porcelain(&output.stdout))
    }

    /// Blame every tracked, present, non-binary file.
    pub fn extract(&self, cancel: &CancelToken) -> Result<BlameOutcome, GitError> {
        let head = head_commit(&self.path)?;
        let files = self.tracked_files()?;
        debug!("{}: blaming {} tracked files at {}", self.name, files.len(), head);

        let per_file: DashMap<String, Vec<(RawAuthor, u64)>> = DashMap::new();
        let skipped: DashMap<String, String> = DashMap::new();
        let blamed = AtomicUsize::new(0);

        files.par_iter().for_each(|file| {
            if cancel.is_cancelled() {
                return;
            }
            let full = self.path.join(file);
            match is_binary(&full) {
                Ok(true) => return,
                Ok(false) => {}
                // Deleted from the working tree but still tracked.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
                Err(e) if full.is_dir() => {
                    debug!("{}: skipping submodule {} ({})", self.name, file, e);
                    return;
                }
                Err(e) => {
                    skipped.insert(file.clone(), e.to_string());
                    return;
                }
            }
            match self.blame_file(file) {
                Ok(counts) => {
                    per_file.insert(file.clone(), counts);
                    blamed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("{}: blame of {} skipped: {}", self.name, file, e);
                    skipped.insert(file.clone(), e.to_string());
                }
            }
        });

        let per_file: BTreeMap<String, Vec<(RawAuthor, u64)>> = per_file.into_iter().collect();
        let counts = per_file
            .into_iter()
            .flat_map(|(path, authors)| {
                authors.into_iter().map(move |(author, lines)| BlameCount {
                    path: path.clone(),
                    author,
                    lines,
                })
            })
            .collect();
        let mut skipped: Vec<(String, String)> = skipped.into_iter().collect();
        skipped.sort();

        Ok(BlameOutcome {
            blame: RepoBlame {
                repo: self.name.clone(),
                head,
                counts,
            },
            skipped,
            files_blamed: blamed.load(Ordering::Relaxed),
        })
    }
}

/// A file is binary when its first 8000 bytes contain a NUL.
pub fn is_binary(path: &Path) -> std::io::Result<bool> {
    let file = std::fs::File::open(path)?;
    let mut buf = Vec::with_capacity(BINARY_SNIFF_LEN);
    file.take(BINARY_SNIFF_LEN as u64).read_to_end(&mut buf)?;
    Ok(buf.contains(&0))
}

/// Count lines per author in `git blame --line-porcelain` output.
///
/// Every content line (prefixed by a tab) is preceded by the full header of
/// its commit, so the most recent `author` / `author-mail` pair owns it.
/// Input is decoded lossily; blame of non-UTF-8 text must not fail.
pub fn parse_line_porcelain(output: &[u8]) -> Vec<(RawAuthor, u64)> {
    let mut counts: BTreeMap<RawAuthor, u64> = BTreeMap::new();
    let mut name = String::new();
    let mut email = String::new();

    for raw in output.split(|b| *b == b'\n') {
        if raw.first() == Some(&b'\t') {
            *counts.entry(RawAuthor::new(name.clone(), email.clone())).or_insert(0) += 1;
            continue;
        }
        if let Some(rest) = raw.strip_prefix(b"author-mail ") {
            let mail = String::from_utf8_lossy(rest);
            email = mail.trim().trim_start_matches('<').trim_end_matches('>').to_string();
        } else if let Some(rest) = raw.strip_prefix(b"author ") {
            name = String::from_utf8_lossy(rest).trim().to_string();
        }
    }

    counts.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{commit_files, init_repo};
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_parse_line_porcelain() {
        let output = b"abc 1 1 2\n\
author Ann\n\
author-mail <ann@x.com>\n\
author-time 1700000000\n\
filename a.py\n\
\tline one\n\
abc 2 2\n\
author Ann\n\
author-mail <ann@x.com>\n\
filename a.py\n\
\tline two\n\
def 3 3 1\n\
author Bob \xff\n\
author-mail <bob@x.com>\n\
filename a.py\n\
\t\n";
        let counts = parse_line_porcelain(output);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0], (RawAuthor::new("Ann", "ann@x.com"), 2));
        assert_eq!(counts[1].0.email, "bob@x.com");
        assert!(counts[1].0.name.starts_with("Bob"));
        assert_eq!(counts[1].1, 1);
    }

    #[test]
    fn test_extract_counts_lines_per_author() -> Result<()> {
        let dir = tempdir()?;
        let repo = init_repo(dir.path())?;
        commit_files(&repo, &[("a.py", "1\n2\n3\n4\n")], "Ann", "ann@x.com", 1_700_000_000, 0)?;
        commit_files(
            &repo,
            &[("a.py", "1\n2\n3\n4\n5\n"), ("b.bin", "\0\x01\x02")],
            "Bob",
            "bob@x.com",
            1_700_100_000,
            0,
        )?;

        let extractor = BlameExtractor::new("solo", dir.path(), GitOptions::default());
        let outcome = extractor.extract(&CancelToken::new())?;
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.files_blamed, 1);
        assert_eq!(outcome.blame.head.len(), 40);

        let mut owned: Vec<(String, u64)> = outcome
            .blame
            .counts
            .iter()
            .map(|c| (c.author.name.clone(), c.lines))
            .collect();
        owned.sort();
        assert_eq!(owned, vec![("Ann".to_string(), 4), ("Bob".to_string(), 1)]);
        Ok(())
    }

    #[test]
    fn test_missing_working_tree_file_is_skipped_silently() -> Result<()> {
        let dir = tempdir()?;
        let repo = init_repo(dir.path())?;
        commit_files(&repo, &[("a.py", "x\n"), ("gone.py", "y\n")], "Ann", "ann@x.com", 1_700_000_000, 0)?;
        std::fs::remove_file(dir.path().join("gone.py"))?;

        let outcome = BlameExtractor::new("solo", dir.path(), GitOptions::default())
            .extract(&CancelToken::new())?;
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.files_blamed, 1);
        Ok(())
    }

    #[test]
    fn test_empty_repository_has_no_head() -> Result<()> {
        let dir = tempdir()?;
        init_repo(dir.path())?;
        let err = BlameExtractor::new("empty", dir.path(), GitOptions::default())
            .extract(&CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, GitError::NoHead(_)));
        Ok(())
    }
}
