//! Shared fixtures: real repositories built with git2 and a matching
//! configuration directory.

#![allow(dead_code)]

use anyhow::Result;
use git2::{Repository, Signature, Time};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// 2024-02-10T12:00:00Z, 2024-03-05T12:00:00Z
pub const FEB_2024: i64 = 1_707_566_400;
pub const MAR_2024: i64 = 1_709_640_000;

/// Commit `files` (path, content) as `name <email>` at `epoch`.
pub fn commit(
    repo: &Repository,
    files: &[(&str, &str)],
    name: &str,
    email: &str,
    epoch: i64,
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
    let sig = Signature::new(name, email, &Time::new(epoch, 0))?;
    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit()?],
        Err(_) => Vec::new(),
    };
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    Ok(repo.commit(Some("HEAD"), &sig, &sig, "change", &tree, &parent_refs)?)
}

/// A workspace with two repositories that share the `billing` subsystem.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    /// - `acme/core`: Ann adds `billing/pay.rs` (3 lines) in February,
    ///   Bob adds `README.md` (1 line) in March, a bot adds `ci.yml` in March
    /// - `acme/billing-svc`: Ann, under an old address, adds `src/lib.rs`
    ///   (2 lines) in March
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let ws = Self { dir };

        std::fs::create_dir_all(ws.repos_root().join("acme/core"))?;
        std::fs::create_dir_all(ws.repos_root().join("acme/billing-svc"))?;

        let core = Repository::init(ws.repos_root().join("acme/core"))?;
        commit(&core, &[("billing/pay.rs", "a\nb\nc\n")], "Ann", "ann@acme.com", FEB_2024)?;
        commit(&core, &[("README.md", "hello\n")], "Bob", "bob@acme.com", MAR_2024)?;
        commit(&core, &[("ci.yml", "x\n")], "CI", "ci-bot@acme.com", MAR_2024 + 60)?;

        let svc = Repository::init(ws.repos_root().join("acme/billing-svc"))?;
        commit(&svc, &[("src/lib.rs", "x\ny\n")], "A. Smith", "asmith@oldcorp.io", MAR_2024 + 3600)?;

        ws.write_config()?;
        Ok(ws)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn repos_root(&self) -> PathBuf {
        self.root().join("repos")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root().join("configuration")
    }

    pub fn output_root(&self) -> PathBuf {
        self.root().join("out")
    }

    pub fn stats_root(&self) -> PathBuf {
        self.output_root().join("stats")
    }

    fn write_config(&self) -> Result<()> {
        let dir = self.config_dir();
        std::fs::create_dir_all(&dir)?;
        std::fs::write(
            dir.join("gitcensus.toml"),
            format!(
                "[settings]\nrepos_root = {:?}\noutput_root = {:?}\nworkers = 2\nlanguages = false\n",
                self.repos_root().to_string_lossy(),
                self.output_root().to_string_lossy()
            ),
        )?;
        std::fs::write(
            dir.join("services.json"),
            r#"{
                "acme/core": {"main": "", "billing": ["billing/"]},
                "acme/billing-svc": {"billing": ""}
            }"#,
        )?;
        std::fs::write(
            dir.join("alias.json"),
            r#"{"ann": ["asmith@oldcorp.io"]}"#,
        )?;
        std::fs::write(
            dir.join("teams.json"),
            r#"{"payments": {"name": "Payments", "description": "Money in, money out", "members": ["ann"]}}"#,
        )?;
        std::fs::write(
            dir.join("team_subsystem_responsibilities.json"),
            r#"{"payments": ["billing"]}"#,
        )?;
        std::fs::write(dir.join("ignore_user.txt"), "# bots\nci-bot@acme.com\n")?;
        Ok(())
    }
}
