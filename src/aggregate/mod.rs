//! Commit aggregation
//!
//! Folds commits into per-developer, per-team and per-subsystem records for
//! the commit's month. The fold is a sum, so commits may be folded in any
//! order and partial [`Aggregator`]s merged afterwards.
//!
//! Counting rules:
//! - a developer or team record counts a commit once;
//! - a subsystem record counts a commit once per subsystem it touches (a file
//!   touches its subsystem when it has changed lines or is binary);
//! - a developer contributes in full to every team they belong to, and to no
//!   team record when they belong to none;
//! - commits by ignored authors contribute nothing.

mod record;

pub use record::{Activity, AggregateKey, AggregateRecord, LineTotals};

use std::collections::BTreeMap;

use crate::identity::{IdentityResolver, Resolution};
use crate::language::{is_doc_language, CodeKind, LanguageIndex};
use crate::models::{Commit, EntityKind, FileChange};
use crate::period::Period;
use crate::subsystem::SubsystemMapper;
use crate::teams::TeamDirectory;

/// Line totals of a set of file changes, split every way a record needs.
#[derive(Debug, Default)]
struct Contribution {
    lines: LineTotals,
    binary: u64,
    languages: BTreeMap<String, LineTotals>,
    code_type: BTreeMap<String, LineTotals>,
    documentation: LineTotals,
}

impl Contribution {
    fn of<'a>(
        repo: &str,
        files: impl IntoIterator<Item = &'a FileChange>,
        languages: &LanguageIndex,
    ) -> Self {
        let mut c = Contribution::default();
        for file in files {
            if file.binary {
                c.binary += 1;
            }
            let (add, del) = (file.additions, file.deletions);
            c.lines.add(add, del);
            let language = languages.language(repo, &file.path);
            c.languages.entry(language.to_string()).or_default().add(add, del);
            c.code_type
                .entry(CodeKind::of(&file.path).as_str().to_string())
                .or_default()
                .add(add, del);
            if is_doc_language(language) {
                c.documentation.add(add, del);
            }
        }
        c
    }

    fn activity(&self) -> Activity {
        Activity::commit(self.lines.additions, self.lines.deletions)
    }
}

impl AggregateRecord {
    /// Count one commit with the given contribution.
    fn apply(&mut self, commit: &Commit, c: &Contribution) {
        self.commits += 1;
        self.add_lines(c.lines.additions, c.lines.deletions);
        self.unmeasurable_changes += c.binary;

        let activity = c.activity();
        let ts = commit.timestamp;
        self.per_weekday
            .entry(ts.format("%A").to_string())
            .or_default()
            .merge(&activity);
        self.per_hour
            .entry(ts.format("%H").to_string())
            .or_default()
            .merge(&activity);
        self.per_date
            .entry(commit.date().format("%Y-%m-%d").to_string())
            .or_default()
            .merge(&activity);
        for (lang, totals) in &c.languages {
            self.languages.entry(lang.clone()).or_default().merge(totals);
        }
        for (kind, totals) in &c.code_type {
            self.code_type.entry(kind.clone()).or_default().merge(totals);
        }
        self.documentation.merge(&c.documentation);
        self.per_repo
            .entry(commit.repo.clone())
            .or_default()
            .merge(&activity);
    }
}

/// Aggregate records keyed by (kind, id, period).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregator {
    records: BTreeMap<AggregateKey, AggregateRecord>,
    commits_folded: u64,
    commits_ignored: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, kind: EntityKind, id: &str, period: Period) -> &mut AggregateRecord {
        let key = AggregateKey::new(kind, id, period);
        self.records
            .entry(key)
            .or_insert_with_key(AggregateRecord::empty)
    }

    /// Merge a single record into the matching one.
    pub fn add(&mut self, record: AggregateRecord) {
        match self.records.get_mut(&record.key()) {
            Some(existing) => existing.merge(&record),
            None => {
                self.records.insert(record.key(), record);
            }
        }
    }

    /// Commutative, associative merge.
    pub fn merge(&mut self, other: Aggregator) {
        self.commits_folded += other.commits_folded;
        self.commits_ignored += other.commits_ignored;
        for (_, record) in other.records {
            self.add(record);
        }
    }

    pub fn get(&self, key: &AggregateKey) -> Option<&AggregateRecord> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &AggregateRecord> {
        self.records.values()
    }

    pub fn into_records(self) -> Vec<AggregateRecord> {
        self.records.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn commits_folded(&self) -> u64 {
        self.commits_folded
    }

    pub fn commits_ignored(&self) -> u64 {
        self.commits_ignored
    }
}

/// Everything the fold needs to attribute a commit.
#[derive(Clone, Copy)]
pub struct AggregationEngine<'a> {
    resolver: &'a dyn IdentityResolver,
    mapper: &'a SubsystemMapper,
    teams: &'a TeamDirectory,
    languages: &'a LanguageIndex,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(
        resolver: &'a dyn IdentityResolver,
        mapper: &'a SubsystemMapper,
        teams: &'a TeamDirectory,
        languages: &'a LanguageIndex,
    ) -> Self {
        Self {
            resolver,
            mapper,
            teams,
            languages,
        }
    }

    /// Fold a batch of commits into a fresh aggregator.
    pub fn aggregate<'c>(&self, commits: impl IntoIterator<Item = &'c Commit>) -> Aggregator {
        let mut agg = Aggregator::new();
        for commit in commits {
            self.fold(&mut agg, commit);
        }
        agg
    }

    /// Fold one commit. Returns false when its author is ignored.
    pub fn fold(&self, agg: &mut Aggregator, commit: &Commit) -> bool {
        let developer = match self.resolver.resolve(&commit.author) {
            Resolution::Developer(slug) => slug,
            Resolution::Ignored => {
                agg.commits_ignored += 1;
                return false;
            }
        };
        agg.commits_folded += 1;
        let period = Period::Month(commit.month);

        let whole = Contribution::of(&commit.repo, &commit.files, self.languages);

        let mut by_subsystem: BTreeMap<String, Vec<&FileChange>> = BTreeMap::new();
        for file in commit.files.iter().filter(|f| f.is_touch()) {
            by_subsystem
                .entry(self.mapper.map(&commit.repo, &file.path))
                .or_default()
                .push(file);
        }
        let parts: Vec<(String, Contribution)> = by_subsystem
            .into_iter()
            .map(|(sub, files)| {
                let c = Contribution::of(&commit.repo, files, self.languages);
                (sub, c)
            })
            .collect();

        let dev = agg.record(EntityKind::Developer, &developer, period);
        dev.apply(commit, &whole);
        if !commit.author.email.is_empty() {
            dev.emails.insert(commit.author.email.clone());
        }
        if !commit.author.name.is_empty() {
            dev.names.insert(commit.author.name.clone());
        }
        if dev.display_name.is_none() {
            dev.display_name = self.resolver.display_name(&developer);
        }
        for (sub, c) in &parts {
            dev.subsystems.entry(sub.clone()).or_default().merge(&c.activity());
        }

        let teams: Vec<String> = self.teams.teams_of(&developer).map(str::to_string).collect();
        for team in &teams {
            let rec = agg.record(EntityKind::Team, team, period);
            rec.apply(commit, &whole);
            rec.developers
                .entry(developer.clone())
                .or_default()
                .merge(&whole.activity());
            for (sub, c) in &parts {
                rec.subsystems.entry(sub.clone()).or_default().merge(&c.activity());
            }
            rec.refresh_top_developer();
        }

        for (sub, c) in &parts {
            let responsible = self.teams.responsible_teams(sub);
            let rec = agg.record(EntityKind::Subsystem, sub, period);
            rec.apply(commit, c);
            rec.developers
                .entry(developer.clone())
                .or_default()
                .merge(&c.activity());
            rec.responsible_teams.extend(responsible);
            rec.refresh_top_developer();
        }

        true
    }
}
