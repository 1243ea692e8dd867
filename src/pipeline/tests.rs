use super::*;
use crate::config::{load_config, SettingsOverrides};
use crate::git::test_support::{commit_files, init_repo};
use crate::store::{MemorySnapshotStore, SnapshotStoreExt, StoreError};
use anyhow::Result;
use std::path::Path;
use tempfile::{tempdir, TempDir};

// 2024-02-10T12:00:00Z and 2024-03-05T12:00:00Z
const FEB: i64 = 1_707_566_400;
const MAR: i64 = 1_709_640_000;

fn month(y: i32, m: u32) -> Month {
    Month::new(y, m).unwrap()
}

/// A config directory pointing at `repos` (name, absolute path).
fn write_config(dir: &Path, repos: &[(&str, &Path)]) -> Result<()> {
    let mut toml = String::from("[settings]\nworkers = 2\nlanguages = false\n");
    for (name, path) in repos {
        toml.push_str(&format!(
            "\n[[repos]]\nname = {:?}\npath = {:?}\n",
            name,
            path.to_string_lossy()
        ));
    }
    std::fs::write(dir.join("gitcensus.toml"), toml)?;
    std::fs::write(
        dir.join("services.json"),
        r#"{"acme/core": {"main": "", "billing": "billing/"}}"#,
    )?;
    std::fs::write(dir.join("ignore_user.txt"), "ci-bot@acme.com\n")?;
    Ok(())
}

/// One repository with a February billing commit by Ann, a March README
/// commit by Bob and a March commit by an ignored bot.
fn acme_core(root: &TempDir) -> Result<std::path::PathBuf> {
    let path = root.path().join("repos/acme/core");
    std::fs::create_dir_all(&path)?;
    let repo = init_repo(&path)?;
    commit_files(&repo, &[("billing/pay.rs", "a\nb\nc\n")], "Ann", "ann@acme.com", FEB, 0)?;
    commit_files(&repo, &[("README.md", "hello\n")], "Bob", "bob@acme.com", MAR, 60)?;
    commit_files(&repo, &[("ci.yml", "x\n")], "CI", "ci-bot@acme.com", MAR + 60, 0)?;
    Ok(path)
}

#[test]
fn test_run_writes_months_years_and_ownership() -> Result<()> {
    let root = tempdir()?;
    let repo = acme_core(&root)?;
    let config_dir = root.path().join("configuration");
    std::fs::create_dir_all(&config_dir)?;
    write_config(&config_dir, &[("acme/core", &repo)])?;
    let config = load_config(&config_dir, &SettingsOverrides::default())?;

    let store = MemorySnapshotStore::new();
    let report = Pipeline::new(&config, &store)
        .with_months(month(2024, 1), month(2024, 3))
        .run()?;

    assert_eq!(report.processed, vec!["acme/core".to_string()]);
    assert!(report.excluded.is_empty());
    assert!(report.skipped.is_empty(), "{:?}", report.skipped);
    assert_eq!(report.commits_folded, 2);
    assert_eq!(report.commits_ignored, 1);
    assert!(!report.cancelled && !report.timed_out);

    let feb = store.read_aggregate(EntityKind::Subsystem, "billing", Period::Month(month(2024, 2)))?;
    assert_eq!(feb.commits, 1);
    assert_eq!(feb.lines_added, 3);

    let ann_year = store.read_aggregate(EntityKind::Developer, "ann", Period::Year(2024))?;
    assert_eq!(ann_year.commits, 1);
    let main_year = store.read_aggregate(EntityKind::Subsystem, "main", Period::Year(2024))?;
    assert_eq!(main_year.commits, 1);
    assert!(store
        .read_aggregate(EntityKind::Developer, "ci-bot", Period::Year(2024))
        .is_err());

    let billing = store.read_ownership("billing")?;
    assert_eq!(billing.total_lines, 3);
    assert_eq!(billing.developers["ann"].percentage, 100.0);
    // The bot's line still counts towards the size of `main`.
    let main = store.read_ownership("main")?;
    assert_eq!(main.total_lines, 1);
    assert_eq!(main.ignored_lines, 1);
    assert_eq!(report.ownership_records, 2);
    Ok(())
}

#[test]
fn test_rerun_is_idempotent() -> Result<()> {
    let root = tempdir()?;
    let repo = acme_core(&root)?;
    let config_dir = root.path().join("configuration");
    std::fs::create_dir_all(&config_dir)?;
    write_config(&config_dir, &[("acme/core", &repo)])?;
    let config = load_config(&config_dir, &SettingsOverrides::default())?;
    let store = MemorySnapshotStore::new();

    let first = Pipeline::new(&config, &store)
        .with_months(month(2024, 2), month(2024, 3))
        .run()?;
    assert!(first.written > 0);
    assert_eq!(first.unchanged, 0);

    let second = Pipeline::new(&config, &store)
        .with_months(month(2024, 2), month(2024, 3))
        .run()?;
    assert_eq!(second.written, 0);
    assert_eq!(second.unchanged, first.written);
    Ok(())
}

#[test]
fn test_rerun_drops_records_no_longer_produced() -> Result<()> {
    let root = tempdir()?;
    let repo = acme_core(&root)?;
    let config_dir = root.path().join("configuration");
    std::fs::create_dir_all(&config_dir)?;
    write_config(&config_dir, &[("acme/core", &repo)])?;
    let store = MemorySnapshotStore::new();

    let config = load_config(&config_dir, &SettingsOverrides::default())?;
    Pipeline::new(&config, &store)
        .with_months(month(2024, 2), month(2024, 3))
        .run()?;
    let march = Period::Month(month(2024, 3));
    assert!(store.read_aggregate(EntityKind::Developer, "bob", march).is_ok());
    assert!(store.read_ownership("main").is_ok());

    std::fs::write(config_dir.join("ignore_user.txt"), "ci-bot@acme.com\nbob@acme.com\n")?;
    let config = load_config(&config_dir, &SettingsOverrides::default())?;
    let report = Pipeline::new(&config, &store)
        .with_months(month(2024, 2), month(2024, 3))
        .run()?;

    assert_eq!(report.commits_folded, 1);
    assert_eq!(report.commits_ignored, 2);
    // bob and main, each for March and for 2024.
    assert_eq!(report.removed, 4);
    for (kind, id) in [(EntityKind::Developer, "bob"), (EntityKind::Subsystem, "main")] {
        assert!(matches!(
            store.read_aggregate(kind, id, march),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.read_aggregate(kind, id, Period::Year(2024)),
            Err(StoreError::NotFound(_))
        ));
    }
    let ann = store.read_aggregate(EntityKind::Developer, "ann", Period::Year(2024))?;
    assert_eq!(ann.commits, 1);

    // Every line of `main` now belongs to an ignored author.
    let main = store.read_ownership("main")?;
    assert_eq!(main.total_lines, 0);
    assert_eq!(main.ignored_lines, 2);
    Ok(())
}

#[test]
fn test_repository_dropped_from_configuration_loses_its_records() -> Result<()> {
    let root = tempdir()?;
    let core = acme_core(&root)?;
    let ledger = root.path().join("repos/acme/ledger");
    std::fs::create_dir_all(&ledger)?;
    let repo = init_repo(&ledger)?;
    commit_files(&repo, &[("ledger.rs", "l1\n")], "Dee", "dee@acme.com", FEB, 0)?;

    let config_dir = root.path().join("configuration");
    std::fs::create_dir_all(&config_dir)?;
    let store = MemorySnapshotStore::new();

    write_config(&config_dir, &[("acme/core", &core), ("acme/ledger", &ledger)])?;
    let config = load_config(&config_dir, &SettingsOverrides::default())?;
    Pipeline::new(&config, &store)
        .with_months(month(2024, 2), month(2024, 2))
        .run()?;
    assert!(store.read_ownership("ledger").is_ok());

    write_config(&config_dir, &[("acme/core", &core)])?;
    let config = load_config(&config_dir, &SettingsOverrides::default())?;
    Pipeline::new(&config, &store)
        .with_months(month(2024, 2), month(2024, 2))
        .run()?;

    assert!(store.list(EntityKind::Developer)?.iter().all(|k| k.id != "dee"));
    assert!(store.list(EntityKind::Subsystem)?.iter().all(|k| k.id != "ledger"));
    assert!(store
        .read_aggregate(EntityKind::Subsystem, "billing", Period::Month(month(2024, 2)))
        .is_ok());
    Ok(())
}

/// Remove the loose blob holding `content`, leaving the commits that
/// reference it unreadable for git.
fn drop_blob(repo_path: &Path, content: &str) -> Result<()> {
    let oid = git2::Oid::hash_object(git2::ObjectType::Blob, content.as_bytes())?.to_string();
    let object = repo_path.join(".git/objects").join(&oid[..2]).join(&oid[2..]);
    std::fs::remove_file(object)?;
    Ok(())
}

#[test]
fn test_failed_units_are_reported_and_keep_their_records() -> Result<()> {
    let root = tempdir()?;
    let core = acme_core(&root)?;
    let ledger = root.path().join("repos/acme/ledger");
    std::fs::create_dir_all(&ledger)?;
    let repo = init_repo(&ledger)?;
    commit_files(&repo, &[("ledger.rs", "l1\nl2\n")], "Ann", "ann@acme.com", FEB, 0)?;
    let broken = "only in the ledger march commit\n";
    commit_files(&repo, &[("broken.rs", broken)], "Bob", "bob@acme.com", MAR + 7200, 0)?;

    let config_dir = root.path().join("configuration");
    std::fs::create_dir_all(&config_dir)?;
    write_config(&config_dir, &[("acme/core", &core), ("acme/ledger", &ledger)])?;
    let config = load_config(&config_dir, &SettingsOverrides::default())?;
    let store = MemorySnapshotStore::new();

    let first = Pipeline::new(&config, &store)
        .with_months(month(2024, 2), month(2024, 3))
        .run()?;
    assert!(first.is_complete(), "{}", first.summary());

    drop_blob(&ledger, broken)?;
    let second = Pipeline::new(&config, &store)
        .with_months(month(2024, 2), month(2024, 3))
        .run()?;

    let units: Vec<&Unit> = second.skipped.iter().map(|s| &s.unit).collect();
    assert_eq!(
        units,
        vec![
            &Unit::History {
                repo: "acme/ledger".into(),
                month: month(2024, 3),
            },
            &Unit::Blame {
                repo: "acme/ledger".into(),
                file: Some("broken.rs".into()),
            },
        ]
    );
    assert!(!second.is_complete());

    // The ledger's February and the core repository are untouched.
    let ledger_feb = store.read_aggregate(EntityKind::Subsystem, "ledger", Period::Month(month(2024, 2)))?;
    assert_eq!(ledger_feb.lines_added, 2);
    let main_march = store.read_aggregate(EntityKind::Subsystem, "main", Period::Month(month(2024, 3)))?;
    assert_eq!(main_march.commits, 1);

    // The failed month keeps what the previous run stored.
    let ledger_march = store.read_aggregate(EntityKind::Subsystem, "ledger", Period::Month(month(2024, 3)))?;
    assert_eq!(ledger_march.commits, 1);
    assert_eq!(ledger_march.developers.keys().collect::<Vec<_>>(), vec!["bob"]);

    let ownership = store.read_ownership("ledger")?;
    assert_eq!(ownership.total_lines, 2);
    assert_eq!(ownership.developers["ann"].percentage, 100.0);
    Ok(())
}

#[test]
fn test_invalid_repository_is_excluded() -> Result<()> {
    let root = tempdir()?;
    let repo = acme_core(&root)?;
    let not_a_repo = root.path().join("repos/plain");
    std::fs::create_dir_all(&not_a_repo)?;
    let config_dir = root.path().join("configuration");
    std::fs::create_dir_all(&config_dir)?;
    write_config(&config_dir, &[("acme/core", &repo), ("plain", &not_a_repo)])?;
    let config = load_config(&config_dir, &SettingsOverrides::default())?;

    let store = MemorySnapshotStore::new();
    let report = Pipeline::new(&config, &store)
        .with_months(month(2024, 2), month(2024, 2))
        .without_blame()
        .run()?;
    assert_eq!(report.processed, vec!["acme/core".to_string()]);
    assert_eq!(report.excluded.len(), 1);
    assert_eq!(report.excluded[0].repo, "plain");
    assert!(!report.is_complete());
    assert_eq!(report.ownership_records, 0);
    Ok(())
}

#[test]
fn test_no_usable_repository_is_fatal() -> Result<()> {
    let root = tempdir()?;
    let missing = root.path().join("repos/gone");
    let config_dir = root.path().join("configuration");
    std::fs::create_dir_all(&config_dir)?;
    write_config(&config_dir, &[("gone", &missing)])?;
    let config = load_config(&config_dir, &SettingsOverrides::default())?;

    let store = MemorySnapshotStore::new();
    let err = Pipeline::new(&config, &store)
        .with_months(month(2024, 2), month(2024, 2))
        .run()
        .unwrap_err();
    assert!(err.to_string().contains("usable"));
    assert!(store.is_empty());
    Ok(())
}

#[test]
fn test_cancelled_run_writes_nothing() -> Result<()> {
    let root = tempdir()?;
    let repo = acme_core(&root)?;
    let config_dir = root.path().join("configuration");
    std::fs::create_dir_all(&config_dir)?;
    write_config(&config_dir, &[("acme/core", &repo)])?;
    let config = load_config(&config_dir, &SettingsOverrides::default())?;

    let cancel = CancelToken::new();
    cancel.cancel();
    let store = MemorySnapshotStore::new();
    let report = Pipeline::new(&config, &store)
        .with_months(month(2024, 1), month(2024, 3))
        .with_cancel(cancel)
        .run()?;
    assert!(report.cancelled);
    assert!(!report.timed_out);
    assert_eq!(report.written, 0);
    assert!(store.is_empty());
    Ok(())
}

#[test]
fn test_cancel_token_deadline() {
    let token = CancelToken::new();
    let expired = token.with_deadline(Instant::now());
    assert!(expired.is_cancelled());
    assert!(expired.timed_out());
    assert!(!token.is_cancelled());

    let later = token.with_deadline(Instant::now() + std::time::Duration::from_secs(3600));
    assert!(!later.is_cancelled());
    token.cancel();
    assert!(later.is_cancelled());
    assert!(!later.timed_out());
}
