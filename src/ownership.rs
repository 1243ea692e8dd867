//! Blame-based ownership and subsystem liveness
//!
//! Ownership is who currently authors the lines of a subsystem at HEAD of
//! every repository that contributes to it. Liveness ("dead subsystem") is
//! derived from the monthly subsystem commit counts, never stored.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::identity::{IdentityResolver, Resolution};
use crate::models::RepoBlame;
use crate::period::Month;
use crate::subsystem::SubsystemMapper;

/// Ownership above this share (strictly) is significant.
pub const SIGNIFICANT_OWNERSHIP_PCT: f64 = 10.0;

/// One developer's share of a subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OwnerShare {
    pub lines_owned: u64,
    /// Share of counted lines, rounded to two decimals
    pub percentage: f64,
}

/// Ownership of the lines one repository contributes to a subsystem, or of a
/// whole repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoOwnership {
    pub total_lines: u64,
    pub developers: BTreeMap<String, OwnerShare>,
    #[serde(default)]
    pub top_owner: Option<String>,
}

impl RepoOwnership {
    fn add(&mut self, developer: &str, lines: u64) {
        self.total_lines += lines;
        self.developers
            .entry(developer.to_string())
            .or_insert(OwnerShare {
                lines_owned: 0,
                percentage: 0.0,
            })
            .lines_owned += lines;
    }

    fn finalize(&mut self) {
        self.top_owner = finalize_shares(&mut self.developers, self.total_lines);
    }
}

/// Current ownership of one subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub subsystem: String,
    /// repository -> HEAD commit the blame was taken at
    pub as_of: BTreeMap<String, String>,
    /// Lines attributed to counted (non-ignored) developers
    pub total_lines: u64,
    /// Lines by ignored authors, excluded from every share
    pub ignored_lines: u64,
    pub developers: BTreeMap<String, OwnerShare>,
    /// The same shares restricted to each contributing repository
    #[serde(default)]
    pub per_repo: BTreeMap<String, RepoOwnership>,
    #[serde(default)]
    pub top_owner: Option<String>,
}

impl OwnershipRecord {
    fn new(subsystem: &str) -> Self {
        Self {
            subsystem: subsystem.to_string(),
            as_of: BTreeMap::new(),
            total_lines: 0,
            ignored_lines: 0,
            developers: BTreeMap::new(),
            per_repo: BTreeMap::new(),
            top_owner: None,
        }
    }

    fn finalize(&mut self) {
        self.top_owner = finalize_shares(&mut self.developers, self.total_lines);
        for repo in self.per_repo.values_mut() {
            repo.finalize();
        }
    }

    /// Developers owning strictly more than `SIGNIFICANT_OWNERSHIP_PCT`,
    /// largest first.
    pub fn significant_owners(&self) -> Vec<(&str, &OwnerShare)> {
        self.owners_above(SIGNIFICANT_OWNERSHIP_PCT)
    }

    /// Developers owning strictly more than `pct` percent, largest first.
    /// Decided on exact line counts, not rounded shares.
    pub fn owners_above(&self, pct: f64) -> Vec<(&str, &OwnerShare)> {
        let mut owners: Vec<(&str, &OwnerShare)> = self
            .developers
            .iter()
            .filter(|(_, s)| s.lines_owned as f64 * 100.0 > pct * self.total_lines as f64)
            .map(|(id, s)| (id.as_str(), s))
            .collect();
        owners.sort_by(|a, b| b.1.lines_owned.cmp(&a.1.lines_owned).then_with(|| a.0.cmp(b.0)));
        owners
    }

    /// Lines of the subsystem at HEAD, ignored authors included.
    pub fn size(&self) -> u64 {
        self.total_lines + self.ignored_lines
    }

    pub fn percentage_sum(&self) -> f64 {
        self.developers.values().map(|s| s.percentage).sum()
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Fill in percentages of `total` and return the top owner (ties to the
/// smallest slug).
fn finalize_shares(developers: &mut BTreeMap<String, OwnerShare>, total: u64) -> Option<String> {
    for share in developers.values_mut() {
        share.percentage = if total == 0 {
            0.0
        } else {
            round2(share.lines_owned as f64 * 100.0 / total as f64)
        };
    }
    developers
        .iter()
        .max_by(|(a_id, a), (b_id, b)| a.lines_owned.cmp(&b.lines_owned).then_with(|| b_id.cmp(a_id)))
        .map(|(id, _)| id.clone())
}

/// Ownership of whole repositories, summed over every subsystem record.
pub fn repository_ownership(
    records: &BTreeMap<String, OwnershipRecord>,
) -> BTreeMap<String, RepoOwnership> {
    let mut repos: BTreeMap<String, RepoOwnership> = BTreeMap::new();
    for record in records.values() {
        for (repo, part) in &record.per_repo {
            let total = repos.entry(repo.clone()).or_default();
            for (dev, share) in &part.developers {
                total.add(dev, share.lines_owned);
            }
        }
    }
    for repo in repos.values_mut() {
        repo.finalize();
    }
    repos
}

/// Folds blame counts into per-subsystem ownership.
pub struct OwnershipEngine<'a> {
    resolver: &'a dyn IdentityResolver,
    mapper: &'a SubsystemMapper,
}

impl<'a> OwnershipEngine<'a> {
    pub fn new(resolver: &'a dyn IdentityResolver, mapper: &'a SubsystemMapper) -> Self {
        Self { resolver, mapper }
    }

    /// Ownership of every subsystem that has blamed lines.
    pub fn compute(&self, blames: &[RepoBlame]) -> BTreeMap<String, OwnershipRecord> {
        let mut records: BTreeMap<String, OwnershipRecord> = BTreeMap::new();

        for blame in blames {
            for count in &blame.counts {
                let subsystem = self.mapper.map(&blame.repo, &count.path);
                let record = records
                    .entry(subsystem.clone())
                    .or_insert_with(|| OwnershipRecord::new(&subsystem));
                record.as_of.insert(blame.repo.clone(), blame.head.clone());
                match self.resolver.resolve(&count.author) {
                    Resolution::Ignored => record.ignored_lines += count.lines,
                    Resolution::Developer(slug) => {
                        record.total_lines += count.lines;
                        record
                            .per_repo
                            .entry(blame.repo.clone())
                            .or_default()
                            .add(&slug, count.lines);
                        record
                            .developers
                            .entry(slug)
                            .or_insert(OwnerShare {
                                lines_owned: 0,
                                percentage: 0.0,
                            })
                            .lines_owned += count.lines;
                    }
                }
            }
        }

        for record in records.values_mut() {
            record.finalize();
        }
        records
    }

    /// Ownership of a single subsystem; an empty record when nothing maps to it.
    pub fn compute_ownership(&self, subsystem: &str, blames: &[RepoBlame]) -> OwnershipRecord {
        self.compute(blames)
            .remove(subsystem)
            .unwrap_or_else(|| OwnershipRecord::new(subsystem))
    }
}

/// Liveness of one subsystem relative to an `as_of` date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadStatus {
    pub is_dead: bool,
    /// Last day of the latest month with commits
    pub last_activity_date: Option<NaiveDate>,
    /// Whole calendar months between that month and `as_of`'s month
    pub months_since_activity: Option<u32>,
}

/// A subsystem is dead when none of the `threshold_months` calendar months
/// ending with `as_of`'s month has commits. `active_months` are the months
/// whose subsystem record has at least one commit.
pub fn dead_status<I>(active_months: I, as_of: NaiveDate, threshold_months: u32) -> DeadStatus
where
    I: IntoIterator<Item = Month>,
{
    let current = Month::of(as_of);
    let latest = active_months.into_iter().filter(|m| *m <= current).max();
    match latest {
        None => DeadStatus {
            is_dead: true,
            last_activity_date: None,
            months_since_activity: None,
        },
        Some(month) => {
            let since = current.months_since(month).max(0) as u32;
            DeadStatus {
                is_dead: since >= threshold_months,
                last_activity_date: Some(month.last_day()),
                months_since_activity: Some(since),
            }
        }
    }
}
