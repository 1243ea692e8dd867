//! Badge computation.
//!
//! Ties are always broken towards the lexicographically smallest slug.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregate::AggregateRecord;
use crate::models::EntityKind;
use crate::ownership::{repository_ownership, OwnershipRecord, SIGNIFICANT_OWNERSHIP_PCT};
use crate::period::{Month, Period};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeKind {
    MostProductive,
    TopMaintainer,
    SignificantOwner,
    SubsystemOwner,
    RepositoryOwner,
}

impl std::fmt::Display for BadgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BadgeKind::MostProductive => "Most Productive",
            BadgeKind::TopMaintainer => "Top Maintainer",
            BadgeKind::SignificantOwner => "Significant Owner",
            BadgeKind::SubsystemOwner => "Subsystem Owner",
            BadgeKind::RepositoryOwner => "Repository Owner",
        };
        f.write_str(s)
    }
}

/// Who holds a badge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Subject {
    Developer(String),
    Team(String),
}

impl Subject {
    pub fn id(&self) -> &str {
        match self {
            Subject::Developer(id) | Subject::Team(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub kind: BadgeKind,
    pub subject: Subject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsystem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub metric_value: f64,
    pub threshold_used: f64,
}

/// Minimums a winner must reach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BadgeThresholds {
    pub most_productive_lines: u64,
    pub top_maintainer_commits: u64,
    pub significant_ownership_pct: f64,
}

impl Default for BadgeThresholds {
    fn default() -> Self {
        Self {
            most_productive_lines: 1000,
            top_maintainer_commits: 3,
            significant_ownership_pct: SIGNIFICANT_OWNERSHIP_PCT,
        }
    }
}

/// Largest value, ties to the smallest key.
fn winner(values: &BTreeMap<String, u64>) -> Option<(&str, u64)> {
    values
        .iter()
        .max_by(|(a_id, a), (b_id, b)| a.cmp(b).then_with(|| b_id.cmp(a_id)))
        .map(|(id, v)| (id.as_str(), *v))
}

/// Developer with the most lines added across every subsystem in `year`.
///
/// `subsystem_years` are yearly subsystem records; their per-developer
/// breakdowns are summed.
pub fn most_productive(
    subsystem_years: &[AggregateRecord],
    year: i32,
    thresholds: &BadgeThresholds,
) -> Option<Badge> {
    let mut totals: BTreeMap<String, u64> = BTreeMap::new();
    for record in subsystem_years
        .iter()
        .filter(|r| r.kind == EntityKind::Subsystem && r.period == Period::Year(year))
    {
        for (dev, activity) in &record.developers {
            *totals.entry(dev.clone()).or_insert(0) += activity.additions;
        }
    }
    let (slug, lines) = winner(&totals)?;
    (lines >= thresholds.most_productive_lines).then(|| Badge {
        kind: BadgeKind::MostProductive,
        subject: Subject::Developer(slug.to_string()),
        subsystem: None,
        repository: None,
        year: Some(year),
        metric_value: lines as f64,
        threshold_used: thresholds.most_productive_lines as f64,
    })
}

/// Team with the most lines added in `year`, from yearly team records.
pub fn most_productive_team(
    team_years: &[AggregateRecord],
    year: i32,
    thresholds: &BadgeThresholds,
) -> Option<Badge> {
    let totals: BTreeMap<String, u64> = team_years
        .iter()
        .filter(|r| r.kind == EntityKind::Team && r.period == Period::Year(year))
        .map(|r| (r.id.clone(), r.lines_added))
        .collect();
    let (team, lines) = winner(&totals)?;
    (lines >= thresholds.most_productive_lines).then(|| Badge {
        kind: BadgeKind::MostProductive,
        subject: Subject::Team(team.to_string()),
        subsystem: None,
        repository: None,
        year: Some(year),
        metric_value: lines as f64,
        threshold_used: thresholds.most_productive_lines as f64,
    })
}

/// Per subsystem, the developer with the most commits over `window`.
///
/// `subsystem_months` are monthly subsystem records; only those whose month
/// is in `window` count.
pub fn top_maintainers(
    subsystem_months: &[AggregateRecord],
    window: &[Month],
    thresholds: &BadgeThresholds,
) -> Vec<Badge> {
    let mut per_subsystem: BTreeMap<&str, BTreeMap<String, u64>> = BTreeMap::new();
    for record in subsystem_months.iter().filter(|r| r.kind == EntityKind::Subsystem) {
        let Period::Month(month) = record.period else {
            continue;
        };
        if !window.contains(&month) {
            continue;
        }
        let commits = per_subsystem.entry(record.id.as_str()).or_default();
        for (dev, activity) in &record.developers {
            *commits.entry(dev.clone()).or_insert(0) += activity.commits;
        }
    }

    per_subsystem
        .into_iter()
        .filter_map(|(subsystem, commits)| {
            let (dev, count) = winner(&commits)?;
            (count >= thresholds.top_maintainer_commits).then(|| Badge {
                kind: BadgeKind::TopMaintainer,
                subject: Subject::Developer(dev.to_string()),
                subsystem: Some(subsystem.to_string()),
                repository: None,
                year: None,
                metric_value: count as f64,
                threshold_used: thresholds.top_maintainer_commits as f64,
            })
        })
        .collect()
}

/// One badge per developer owning more than the threshold of a subsystem.
pub fn significant_owners(
    ownership: &BTreeMap<String, OwnershipRecord>,
    thresholds: &BadgeThresholds,
) -> Vec<Badge> {
    let mut badges = Vec::new();
    for (subsystem, record) in ownership {
        let mut owners = record.owners_above(thresholds.significant_ownership_pct);
        owners.sort_by(|a, b| a.0.cmp(b.0));
        for (dev, share) in owners {
            badges.push(Badge {
                kind: BadgeKind::SignificantOwner,
                subject: Subject::Developer(dev.to_string()),
                subsystem: Some(subsystem.clone()),
                repository: None,
                year: None,
                metric_value: share.percentage,
                threshold_used: thresholds.significant_ownership_pct,
            });
        }
    }
    badges
}

/// The top blame owner of every subsystem.
pub fn subsystem_owners(ownership: &BTreeMap<String, OwnershipRecord>) -> Vec<Badge> {
    ownership
        .iter()
        .filter_map(|(subsystem, record)| {
            let owner = record.top_owner.as_ref()?;
            let share = record.developers.get(owner)?;
            Some(Badge {
                kind: BadgeKind::SubsystemOwner,
                subject: Subject::Developer(owner.clone()),
                subsystem: Some(subsystem.clone()),
                repository: None,
                year: None,
                metric_value: share.percentage,
                threshold_used: 0.0,
            })
        })
        .collect()
}

/// The top blame owner of every repository, over all of its subsystems.
pub fn repository_owners(ownership: &BTreeMap<String, OwnershipRecord>) -> Vec<Badge> {
    repository_ownership(ownership)
        .into_iter()
        .filter_map(|(repo, part)| {
            let owner = part.top_owner?;
            let share = part.developers.get(&owner)?;
            Some(Badge {
                kind: BadgeKind::RepositoryOwner,
                subject: Subject::Developer(owner.clone()),
                subsystem: None,
                repository: Some(repo),
                year: None,
                metric_value: share.percentage,
                threshold_used: 0.0,
            })
        })
        .collect()
}
