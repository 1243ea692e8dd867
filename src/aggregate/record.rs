//! Aggregate record types.
//!
//! Every counter in a record is additive, so records for the same key merge
//! by field-wise addition in any order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::EntityKind;
use crate::period::Period;

/// Line totals without a commit count (languages, code type, documentation).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineTotals {
    pub additions: u64,
    pub deletions: u64,
    pub net_lines: i64,
}

impl LineTotals {
    pub fn add(&mut self, additions: u64, deletions: u64) {
        self.additions += additions;
        self.deletions += deletions;
        self.net_lines = self.additions as i64 - self.deletions as i64;
    }

    pub fn merge(&mut self, other: &LineTotals) {
        self.add(other.additions, other.deletions);
    }

    pub fn is_empty(&self) -> bool {
        self.additions == 0 && self.deletions == 0
    }
}

/// Commit count plus line totals (histograms, breakdowns).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Activity {
    pub commits: u64,
    pub additions: u64,
    pub deletions: u64,
    pub net_lines: i64,
}

impl Activity {
    pub fn commit(additions: u64, deletions: u64) -> Self {
        Self {
            commits: 1,
            additions,
            deletions,
            net_lines: additions as i64 - deletions as i64,
        }
    }

    pub fn merge(&mut self, other: &Activity) {
        self.commits += other.commits;
        self.additions += other.additions;
        self.deletions += other.deletions;
        self.net_lines = self.additions as i64 - self.deletions as i64;
    }

    pub fn changed_lines(&self) -> u64 {
        self.additions + self.deletions
    }
}

fn merge_activity(into: &mut BTreeMap<String, Activity>, from: &BTreeMap<String, Activity>) {
    for (k, v) in from {
        into.entry(k.clone()).or_default().merge(v);
    }
}

fn merge_totals(into: &mut BTreeMap<String, LineTotals>, from: &BTreeMap<String, LineTotals>) {
    for (k, v) in from {
        into.entry(k.clone()).or_default().merge(v);
    }
}

/// Identifies one aggregate record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub kind: EntityKind,
    pub id: String,
    pub period: Period,
}

impl AggregateKey {
    pub fn new(kind: EntityKind, id: impl Into<String>, period: Period) -> Self {
        Self {
            kind,
            id: id.into(),
            period,
        }
    }
}

impl std::fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.kind, self.id, self.period.label())
    }
}

/// Statistics of one developer, team or subsystem over one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub kind: EntityKind,
    pub id: String,
    pub period: Period,
    #[serde(default)]
    pub commits: u64,
    #[serde(default)]
    pub lines_added: u64,
    #[serde(default)]
    pub lines_deleted: u64,
    #[serde(default)]
    pub net_lines: i64,
    #[serde(default)]
    pub changed_lines: u64,
    /// Binary file changes: activity without line counts
    #[serde(default)]
    pub unmeasurable_changes: u64,
    #[serde(default)]
    pub per_weekday: BTreeMap<String, Activity>,
    #[serde(default)]
    pub per_hour: BTreeMap<String, Activity>,
    #[serde(default)]
    pub per_date: BTreeMap<String, Activity>,
    #[serde(default)]
    pub languages: BTreeMap<String, LineTotals>,
    /// `prod` / `test`
    #[serde(default)]
    pub code_type: BTreeMap<String, LineTotals>,
    #[serde(default)]
    pub documentation: LineTotals,
    #[serde(default)]
    pub per_repo: BTreeMap<String, Activity>,
    /// Team and subsystem views
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub developers: BTreeMap<String, Activity>,
    /// Developer and team views
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subsystems: BTreeMap<String, Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub emails: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub names: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_developer: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub responsible_teams: BTreeSet<String>,
}

impl AggregateRecord {
    pub fn empty(key: &AggregateKey) -> Self {
        Self {
            kind: key.kind,
            id: key.id.clone(),
            period: key.period,
            commits: 0,
            lines_added: 0,
            lines_deleted: 0,
            net_lines: 0,
            changed_lines: 0,
            unmeasurable_changes: 0,
            per_weekday: BTreeMap::new(),
            per_hour: BTreeMap::new(),
            per_date: BTreeMap::new(),
            languages: BTreeMap::new(),
            code_type: BTreeMap::new(),
            documentation: LineTotals::default(),
            per_repo: BTreeMap::new(),
            developers: BTreeMap::new(),
            subsystems: BTreeMap::new(),
            display_name: None,
            emails: BTreeSet::new(),
            names: BTreeSet::new(),
            top_developer: None,
            responsible_teams: BTreeSet::new(),
        }
    }

    pub fn key(&self) -> AggregateKey {
        AggregateKey::new(self.kind, self.id.clone(), self.period)
    }

    /// Add line counts without touching the commit count.
    pub(crate) fn add_lines(&mut self, additions: u64, deletions: u64) {
        self.lines_added += additions;
        self.lines_deleted += deletions;
        self.net_lines = self.lines_added as i64 - self.lines_deleted as i64;
        self.changed_lines = self.lines_added + self.lines_deleted;
    }

    /// Field-wise sum. Derived fields are recomputed from the merged data,
    /// so `a.merge(b)` and `b.merge(a)` yield the same record.
    pub fn merge(&mut self, other: &AggregateRecord) {
        self.commits += other.commits;
        self.add_lines(other.lines_added, other.lines_deleted);
        self.unmeasurable_changes += other.unmeasurable_changes;
        merge_activity(&mut self.per_weekday, &other.per_weekday);
        merge_activity(&mut self.per_hour, &other.per_hour);
        merge_activity(&mut self.per_date, &other.per_date);
        merge_totals(&mut self.languages, &other.languages);
        merge_totals(&mut self.code_type, &other.code_type);
        self.documentation.merge(&other.documentation);
        merge_activity(&mut self.per_repo, &other.per_repo);
        merge_activity(&mut self.developers, &other.developers);
        merge_activity(&mut self.subsystems, &other.subsystems);
        self.emails.extend(other.emails.iter().cloned());
        self.names.extend(other.names.iter().cloned());
        self.responsible_teams
            .extend(other.responsible_teams.iter().cloned());
        self.display_name = match (self.display_name.take(), other.display_name.clone()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.refresh_top_developer();
    }

    /// Developer with the most changed lines; ties go to the smallest slug.
    pub(crate) fn refresh_top_developer(&mut self) {
        self.top_developer = self
            .developers
            .iter()
            .max_by(|(a_id, a), (b_id, b)| {
                a.changed_lines()
                    .cmp(&b.changed_lines())
                    .then_with(|| b_id.cmp(a_id))
            })
            .map(|(id, _)| id.clone());
    }

    /// Sum of `months` re-labelled as `period` (the year roll-up).
    pub fn sum<'a, I>(key: &AggregateKey, months: I) -> Self
    where
        I: IntoIterator<Item = &'a AggregateRecord>,
    {
        let mut total = AggregateRecord::empty(key);
        for month in months {
            total.merge(month);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Month;

    fn key(id: &str) -> AggregateKey {
        AggregateKey::new(
            EntityKind::Subsystem,
            id,
            Period::Month(Month::new(2025, 1).unwrap()),
        )
    }

    #[test]
    fn test_net_lines_can_be_negative() {
        let mut t = LineTotals::default();
        t.add(3, 10);
        assert_eq!(t.net_lines, -7);
        let mut r = AggregateRecord::empty(&key("x"));
        r.add_lines(1, 4);
        assert_eq!(r.net_lines, -3);
        assert_eq!(r.changed_lines, 5);
    }

    #[test]
    fn test_top_developer_ties_go_to_smallest_slug() {
        let mut r = AggregateRecord::empty(&key("billing"));
        r.developers.insert("zed".into(), Activity::commit(5, 5));
        r.developers.insert("amy".into(), Activity::commit(10, 0));
        r.developers.insert("bob".into(), Activity::commit(1, 0));
        r.refresh_top_developer();
        assert_eq!(r.top_developer.as_deref(), Some("amy"));
    }

    #[test]
    fn test_sum_relabels_period() {
        let mut a = AggregateRecord::empty(&key("x"));
        a.commits = 2;
        a.add_lines(10, 1);
        let year = AggregateKey::new(EntityKind::Subsystem, "x", Period::Year(2025));
        let total = AggregateRecord::sum(&year, [&a, &a]);
        assert_eq!(total.period, Period::Year(2025));
        assert_eq!(total.commits, 4);
        assert_eq!(total.lines_added, 20);
        assert_eq!(total.net_lines, 18);
    }
}
