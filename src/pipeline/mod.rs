//! Census pipeline
//!
//! Orchestrates one batch run:
//! 1. Validate repositories (an invalid one is excluded, not fatal)
//! 2. Classify languages with cloc (optional)
//! 3. Extract and fold history per (repository × month), writing each
//!    month's records once all of its repositories are done
//! 4. Recompute year records from the stored months
//! 5. Blame every repository at HEAD and write subsystem ownership
//!
//! A finished month, year or ownership pass replaces what was stored: records
//! it no longer produces are deleted. Records holding data of a repository
//! that failed or was excluded in this run are kept.
//!
//! All work runs on one bounded rayon pool. Cancellation and the job
//! deadline stop scheduling new work; snapshots already written stay.

mod progress;
mod report;

pub use report::{ExcludedRepo, RunReport, SkippedUnit, Unit};

use anyhow::{bail, Context, Result};
use indicatif::{MultiProgress, ProgressBar};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregate::{AggregateKey, AggregateRecord, AggregationEngine, Aggregator};
use crate::config::CensusConfig;
use crate::exec::is_tool_installed;
use crate::git::{open_repository, BlameExtractor, GitOptions, HistoryExtractor};
use crate::language::{LanguageIndex, LanguageMap};
use crate::models::{EntityKind, RepoBlame};
use crate::ownership::OwnershipEngine;
use crate::period::{Month, Period};
use crate::store::{SnapshotKey, SnapshotStore, SnapshotStoreExt, Slot, WriteOutcome};

/// Shared cancellation flag with an optional deadline.
///
/// Clones observe the same flag. A token past its deadline reports itself
/// cancelled too; [`CancelToken::timed_out`] tells the two apart.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.timed_out()
    }

    /// A token sharing this flag that also expires at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(deadline),
        }
    }

    pub fn timed_out(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// A repository that passed validation.
#[derive(Debug, Clone)]
struct ValidRepo {
    name: String,
    path: PathBuf,
}

/// Per-month result, merged into the report after the parallel phase.
#[derive(Debug, Default)]
struct MonthOutcome {
    /// All repositories were attempted and the records written
    completed: bool,
    skipped: Vec<SkippedUnit>,
    produced: BTreeSet<SnapshotKey>,
    folded: u64,
    ignored: u64,
    written: usize,
    unchanged: usize,
    removed: usize,
}

#[derive(Debug, Default)]
struct WriteCounts {
    written: usize,
    unchanged: usize,
    removed: usize,
}

impl WriteCounts {
    fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written => self.written += 1,
            WriteOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// One census run over a loaded configuration.
pub struct Pipeline<'a> {
    config: &'a CensusConfig,
    store: &'a dyn SnapshotStore,
    months: Vec<Month>,
    history: bool,
    blame: bool,
    dry_run: bool,
    cancel: CancelToken,
    progress: Option<MultiProgress>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a CensusConfig, store: &'a dyn SnapshotStore) -> Self {
        Self {
            config,
            store,
            months: Vec::new(),
            history: true,
            blame: true,
            dry_run: false,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    /// Months to extract, inclusive. An empty range skips history.
    pub fn with_months(mut self, from: Month, to: Month) -> Self {
        self.months = Month::range(from, to);
        self
    }

    pub fn without_history(mut self) -> Self {
        self.history = false;
        self
    }

    pub fn without_blame(mut self) -> Self {
        self.blame = false;
        self
    }

    /// Only marks the report; the caller chooses a non-persistent store.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, multi: MultiProgress) -> Self {
        self.progress = Some(multi);
        self
    }

    /// Run every enabled phase.
    ///
    /// Errors are fatal problems only: no repositories, no valid repository,
    /// a pool that cannot be built, or a snapshot that cannot be written.
    /// Everything else ends up in the report.
    pub fn run(&self) -> Result<RunReport> {
        let settings = &self.config.settings;
        let mut report = RunReport::start(self.dry_run);
        report.warnings = self.config.warnings.iter().map(|w| w.to_string()).collect();

        if self.config.repos.is_empty() {
            bail!(
                "no repositories configured or found under {}",
                settings.repos_root.display()
            );
        }

        let repos = self.validate_repos(&mut report);
        if repos.is_empty() {
            bail!("none of the {} configured repositories is usable", self.config.repos.len());
        }
        report.processed = repos.iter().map(|r| r.name.clone()).collect();
        let excluded: BTreeSet<String> = report.excluded.iter().map(|e| e.repo.clone()).collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.workers)
            .build()
            .context("Failed to build worker pool")?;
        let cancel = self
            .cancel
            .with_deadline(Instant::now() + settings.job_timeout());
        let options = GitOptions::from_settings(settings);

        info!(
            "Run {}: {} repositories, {} months, {} workers",
            report.run_id,
            repos.len(),
            self.months.len(),
            settings.workers
        );

        if self.history && !self.months.is_empty() {
            report.months = self.months.clone();
            let languages = pool.install(|| self.classify_languages(&repos, &mut report));
            let outcomes = pool.install(|| {
                self.extract_history(&repos, &languages, options, &cancel, &excluded)
            })?;
            for outcome in outcomes {
                report.skipped.extend(outcome.skipped);
                report.commits_folded += outcome.folded;
                report.commits_ignored += outcome.ignored;
                report.written += outcome.written;
                report.unchanged += outcome.unchanged;
                report.removed += outcome.removed;
            }

            if cancel.is_cancelled() {
                info!("Skipping year roll-up: run stopped early");
            } else {
                let years: BTreeSet<i32> = self.months.iter().map(|m| m.year).collect();
                let counts = self.roll_up_years(&years)?;
                report.written += counts.written;
                report.unchanged += counts.unchanged;
                report.removed += counts.removed;
            }
        }

        if self.blame && !cancel.is_cancelled() {
            let blames = pool.install(|| self.extract_blame(&repos, options, &cancel, &mut report));
            if cancel.is_cancelled() {
                info!("Skipping ownership: run stopped during blame");
            } else {
                let mut protected = excluded.clone();
                protected.extend(
                    repos
                        .iter()
                        .filter(|r| !blames.iter().any(|b| b.repo == r.name))
                        .map(|r| r.name.clone()),
                );
                let counts = self.write_ownership(&blames, &protected, &mut report)?;
                report.written += counts.written;
                report.unchanged += counts.unchanged;
                report.removed += counts.removed;
            }
        }

        report.timed_out = cancel.timed_out();
        report.cancelled = !report.timed_out && cancel.is_cancelled();
        report.skipped.sort();
        report.finished_at = chrono::Utc::now();
        info!("Run {} finished: {}", report.run_id, report.summary());
        Ok(report)
    }

    fn validate_repos(&self, report: &mut RunReport) -> Vec<ValidRepo> {
        let mut valid = Vec::new();
        for spec in &self.config.repos {
            match open_repository(&spec.path) {
                Ok(_) => valid.push(ValidRepo {
                    name: spec.name.clone(),
                    path: spec.path.clone(),
                }),
                Err(e) => {
                    warn!("Excluding repository {}: {}", spec.name, e);
                    report.excluded.push(ExcludedRepo {
                        repo: spec.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        valid
    }

    fn classify_languages(&self, repos: &[ValidRepo], report: &mut RunReport) -> LanguageIndex {
        let mut index = LanguageIndex::new();
        let settings = &self.config.settings;
        if !settings.languages {
            return index;
        }
        if !is_tool_installed("cloc") {
            report
                .warnings
                .push("cloc is not installed; languages are reported as Unknown".to_string());
            return index;
        }

        let spinner = self.spinner("Classifying languages...");
        let results: Vec<(String, Result<LanguageMap, crate::exec::ProcessError>)> = repos
            .par_iter()
            .map(|repo| {
                let map = LanguageMap::from_cloc(&repo.path, settings.cloc_timeout(), settings.retry_backoff());
                (repo.name.clone(), map)
            })
            .collect();
        for (repo, result) in results {
            match result {
                Ok(map) => {
                    debug!("{}: {} files classified", repo, map.len());
                    index.insert(&repo, map);
                }
                Err(e) => {
                    warn!("Language classification of {} skipped: {}", repo, e);
                    report.skip(Unit::Languages { repo }, e);
                }
            }
        }
        spinner.finish_and_clear();
        index
    }

    fn extract_history(
        &self,
        repos: &[ValidRepo],
        languages: &LanguageIndex,
        options: GitOptions,
        cancel: &CancelToken,
        excluded: &BTreeSet<String>,
    ) -> Result<Vec<MonthOutcome>> {
        let engine = AggregationEngine::new(
            &self.config.identities,
            &self.config.subsystems,
            &self.config.teams,
            languages,
        );
        let bar = self.bar((self.months.len() * repos.len()) as u64, "Extracting history");

        let mut outcomes = self
            .months
            .par_iter()
            .map(|&month| self.process_month(month, repos, &engine, options, cancel, &bar))
            .collect::<Result<Vec<_>>>()?;
        bar.finish_and_clear();

        for (month, outcome) in self.months.iter().zip(outcomes.iter_mut()) {
            if !outcome.completed {
                continue;
            }
            let mut protected = excluded.clone();
            protected.extend(outcome.skipped.iter().filter_map(|s| match &s.unit {
                Unit::History { repo, .. } => Some(repo.clone()),
                _ => None,
            }));
            outcome.removed = self.prune_period(Period::Month(*month), &outcome.produced, &protected)?;
        }
        Ok(outcomes)
    }

    fn process_month(
        &self,
        month: Month,
        repos: &[ValidRepo],
        engine: &AggregationEngine<'_>,
        options: GitOptions,
        cancel: &CancelToken,
        bar: &ProgressBar,
    ) -> Result<MonthOutcome> {
        let mut outcome = MonthOutcome::default();
        if cancel.is_cancelled() {
            return Ok(outcome);
        }

        let per_repo: Vec<(String, Option<Aggregator>, Option<String>)> = repos
            .par_iter()
            .map(|repo| {
                if cancel.is_cancelled() {
                    return (repo.name.clone(), None, None);
                }
                let extractor = HistoryExtractor::new(&repo.name, &repo.path, options);
                let result = match extractor.extract_month(month) {
                    Ok(commits) => (repo.name.clone(), Some(engine.aggregate(&commits)), None),
                    Err(e) => {
                        warn!("History of {} for {} skipped: {}", repo.name, month, e);
                        (repo.name.clone(), None, Some(e.to_string()))
                    }
                };
                bar.inc(1);
                result
            })
            .collect();

        // A month interrupted half way is not written.
        if cancel.is_cancelled() {
            return Ok(outcome);
        }

        let mut month_agg = Aggregator::new();
        for (repo, agg, failure) in per_repo {
            if let Some(agg) = agg {
                month_agg.merge(agg);
            }
            if let Some(reason) = failure {
                outcome.skipped.push(SkippedUnit {
                    unit: Unit::History { repo, month },
                    reason,
                });
            }
        }
        outcome.folded = month_agg.commits_folded();
        outcome.ignored = month_agg.commits_ignored();

        for record in month_agg.records() {
            match self
                .store
                .write_aggregate(record)
                .with_context(|| format!("Failed to write {}", record.key()))?
            {
                WriteOutcome::Written => outcome.written += 1,
                WriteOutcome::Unchanged => outcome.unchanged += 1,
            }
            outcome.produced.insert(SnapshotKey::from(&record.key()));
        }
        outcome.completed = true;
        debug!(
            "{}: {} commits folded into {} records",
            month,
            outcome.folded,
            month_agg.len()
        );
        Ok(outcome)
    }

    /// Rebuild the year records of `years` from every stored month.
    fn roll_up_years(&self, years: &BTreeSet<i32>) -> Result<WriteCounts> {
        let mut counts = WriteCounts::default();
        let mut produced = BTreeSet::new();
        for kind in EntityKind::ALL {
            let months = self
                .store
                .load_aggregates(kind, &|p| !p.is_yearly() && years.contains(&p.year()))
                .with_context(|| format!("Failed to load stored {} months", kind))?;

            let mut grouped: BTreeMap<(String, i32), Vec<AggregateRecord>> = BTreeMap::new();
            for record in months {
                grouped
                    .entry((record.id.clone(), record.period.year()))
                    .or_default()
                    .push(record);
            }
            for ((id, year), records) in grouped {
                let key = AggregateKey::new(kind, id, Period::Year(year));
                let total = AggregateRecord::sum(&key, &records);
                counts.record(
                    self.store
                        .write_aggregate(&total)
                        .with_context(|| format!("Failed to write {}", key))?,
                );
                produced.insert(SnapshotKey::from(&key));
            }
        }
        // Years are derived from the stored months alone.
        for &year in years {
            counts.removed += self.prune_period(Period::Year(year), &produced, &BTreeSet::new())?;
        }
        Ok(counts)
    }

    /// Delete the stored records of `period` that are not in `produced`.
    /// A record holding activity of a `protected` repository is kept.
    fn prune_period(
        &self,
        period: Period,
        produced: &BTreeSet<SnapshotKey>,
        protected: &BTreeSet<String>,
    ) -> Result<usize> {
        let mut removed = 0;
        for kind in EntityKind::ALL {
            let stale: Vec<SnapshotKey> = self
                .store
                .list(kind)
                .with_context(|| format!("Failed to list stored {}", kind))?
                .into_iter()
                .filter(|key| key.period() == Some(period) && !produced.contains(key))
                .collect();
            for key in stale {
                if !protected.is_empty() {
                    if let Ok(stored) = self.store.read_aggregate(kind, &key.id, period) {
                        if stored.per_repo.keys().any(|repo| protected.contains(repo)) {
                            debug!("Keeping {}: it holds data of a skipped repository", key);
                            continue;
                        }
                    }
                }
                if self
                    .store
                    .delete(&key)
                    .with_context(|| format!("Failed to remove {}", key))?
                {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            info!("{}: removed {} records no longer produced", period.label(), removed);
        }
        Ok(removed)
    }

    fn extract_blame(
        &self,
        repos: &[ValidRepo],
        options: GitOptions,
        cancel: &CancelToken,
        report: &mut RunReport,
    ) -> Vec<RepoBlame> {
        let spinner = self.spinner("Blaming tracked files...");
        let results: Vec<_> = repos
            .par_iter()
            .map(|repo| {
                let extractor = BlameExtractor::new(&repo.name, &repo.path, options);
                (repo.name.clone(), extractor.extract(cancel))
            })
            .collect();
        spinner.finish_and_clear();

        let mut blames = Vec::new();
        for (repo, result) in results {
            match result {
                Ok(outcome) => {
                    debug!("{}: {} files blamed", repo, outcome.files_blamed);
                    for (file, reason) in outcome.skipped {
                        report.skipped.push(SkippedUnit {
                            unit: Unit::Blame {
                                repo: repo.clone(),
                                file: Some(file),
                            },
                            reason,
                        });
                    }
                    blames.push(outcome.blame);
                }
                Err(e) => {
                    warn!("Blame of {} skipped: {}", repo, e);
                    report.skip(Unit::Blame { repo, file: None }, e);
                }
            }
        }
        blames
    }

    /// Write every ownership record and delete those of subsystems that no
    /// longer have blamed lines, unless a `protected` repository fed them.
    fn write_ownership(
        &self,
        blames: &[RepoBlame],
        protected: &BTreeSet<String>,
        report: &mut RunReport,
    ) -> Result<WriteCounts> {
        let engine = OwnershipEngine::new(&self.config.identities, &self.config.subsystems);
        let records = engine.compute(blames);
        let mut counts = WriteCounts::default();
        for record in records.values() {
            counts.record(
                self.store
                    .write_ownership(record)
                    .with_context(|| format!("Failed to write ownership of {}", record.subsystem))?,
            );
        }
        report.ownership_records = records.len();

        let stored = self
            .store
            .list(EntityKind::Subsystem)
            .context("Failed to list stored ownership")?;
        for key in stored {
            if key.slot != Slot::Current || records.contains_key(&key.id) {
                continue;
            }
            if let Ok(old) = self.store.read_ownership(&key.id) {
                if old.as_of.keys().any(|repo| protected.contains(repo)) {
                    debug!("Keeping {}: it holds data of a skipped repository", key);
                    continue;
                }
            }
            if self
                .store
                .delete(&key)
                .with_context(|| format!("Failed to remove {}", key))?
            {
                counts.removed += 1;
            }
        }
        Ok(counts)
    }

    fn spinner(&self, message: &'static str) -> ProgressBar {
        match &self.progress {
            Some(multi) => {
                let spinner = multi.add(ProgressBar::new_spinner());
                spinner.set_style(progress::spinner_style());
                spinner.set_message(message);
                spinner.enable_steady_tick(std::time::Duration::from_millis(100));
                spinner
            }
            None => ProgressBar::hidden(),
        }
    }

    fn bar(&self, len: u64, message: &'static str) -> ProgressBar {
        match &self.progress {
            Some(multi) => {
                let bar = multi.add(ProgressBar::new(len));
                bar.set_style(progress::bar_style());
                bar.set_message(message);
                bar
            }
            None => ProgressBar::hidden(),
        }
    }
}

#[cfg(test)]
mod tests;
