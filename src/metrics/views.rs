//! Metrics computed on read from stored snapshots.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::badges::{self, Badge, BadgeThresholds};
use super::sizes::{size_rankings, SizeRanking};
use crate::models::EntityKind;
use crate::ownership::{dead_status, DeadStatus};
use crate::period::{trailing_months, Month, Period};
use crate::store::{SnapshotStore, SnapshotStoreExt, StoreError};

/// Every badge earned for `year`, plus the rolling maintainer badges as of
/// `as_of` and the subsystem and repository ownership badges.
pub fn collect_badges(
    store: &dyn SnapshotStore,
    year: i32,
    as_of: NaiveDate,
    maintainer_window: u32,
    thresholds: &BadgeThresholds,
) -> Result<Vec<Badge>, StoreError> {
    let mut all = Vec::new();

    let yearly = |p: &Period| *p == Period::Year(year);
    let subsystem_years = store.load_aggregates(EntityKind::Subsystem, &yearly)?;
    all.extend(badges::most_productive(&subsystem_years, year, thresholds));
    let team_years = store.load_aggregates(EntityKind::Team, &yearly)?;
    all.extend(badges::most_productive_team(&team_years, year, thresholds));

    let window = trailing_months(as_of, maintainer_window);
    let in_window = |p: &Period| matches!(p, Period::Month(m) if window.contains(m));
    let subsystem_months = store.load_aggregates(EntityKind::Subsystem, &in_window)?;
    all.extend(badges::top_maintainers(&subsystem_months, &window, thresholds));

    let ownership = store.load_ownership()?;
    all.extend(badges::significant_owners(&ownership, thresholds));
    all.extend(badges::subsystem_owners(&ownership));
    all.extend(badges::repository_owners(&ownership));
    Ok(all)
}

/// Liveness of one subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsystemStatus {
    pub subsystem: String,
    #[serde(flatten)]
    pub status: DeadStatus,
}

/// Dead-subsystem view over every subsystem known from stored months,
/// stored ownership and `known` (typically the configured subsystems).
pub fn subsystem_statuses(
    store: &dyn SnapshotStore,
    known: &BTreeSet<String>,
    as_of: NaiveDate,
    threshold_months: u32,
) -> Result<Vec<SubsystemStatus>, StoreError> {
    let mut active: BTreeMap<String, Vec<Month>> =
        known.iter().map(|s| (s.clone(), Vec::new())).collect();

    for record in store.load_aggregates(EntityKind::Subsystem, &|p| !p.is_yearly())? {
        let months = active.entry(record.id.clone()).or_default();
        if let Period::Month(month) = record.period {
            if record.commits > 0 {
                months.push(month);
            }
        }
    }
    for subsystem in store.load_ownership()?.into_keys() {
        active.entry(subsystem).or_default();
    }

    Ok(active
        .into_iter()
        .map(|(subsystem, months)| SubsystemStatus {
            subsystem,
            status: dead_status(months, as_of, threshold_months),
        })
        .collect())
}

/// Size rankings from the stored ownership records.
pub fn subsystem_sizes(store: &dyn SnapshotStore) -> Result<Vec<SizeRanking>, StoreError> {
    let ownership = store.load_ownership()?;
    Ok(size_rankings(
        ownership.into_iter().map(|(subsystem, record)| (subsystem, record.size())),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Activity, AggregateKey, AggregateRecord};
    use crate::metrics::{BadgeKind, SizeBucket, Subject};
    use crate::ownership::{OwnerShare, OwnershipRecord};
    use crate::store::MemorySnapshotStore;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn subsystem_record(id: &str, period: Period, devs: &[(&str, u64, u64)]) -> AggregateRecord {
        let mut record = AggregateRecord::empty(&AggregateKey::new(EntityKind::Subsystem, id, period));
        for (dev, commits, added) in devs {
            let mut activity = Activity::commit(*added, 0);
            activity.commits = *commits;
            record.commits += commits;
            record.lines_added += added;
            record.developers.insert(dev.to_string(), activity);
        }
        record
    }

    fn ownership(subsystem: &str, owners: &[(&str, u64)], ignored: u64) -> OwnershipRecord {
        let total: u64 = owners.iter().map(|(_, l)| l).sum();
        OwnershipRecord {
            subsystem: subsystem.into(),
            as_of: BTreeMap::new(),
            total_lines: total,
            ignored_lines: ignored,
            developers: owners
                .iter()
                .map(|(d, l)| {
                    (
                        d.to_string(),
                        OwnerShare {
                            lines_owned: *l,
                            percentage: (*l as f64 * 10_000.0 / total as f64).round() / 100.0,
                        },
                    )
                })
                .collect(),
            per_repo: BTreeMap::new(),
            top_owner: owners.iter().max_by_key(|(_, l)| *l).map(|(d, _)| d.to_string()),
        }
    }

    fn of_kind(badges: &[Badge], kind: BadgeKind) -> Vec<&Badge> {
        badges.iter().filter(|b| b.kind == kind).collect()
    }

    #[test]
    fn test_badges_from_store() -> Result<(), StoreError> {
        let store = MemorySnapshotStore::new();
        store.write_aggregate(&subsystem_record(
            "billing",
            Period::Year(2025),
            &[("alice", 10, 1200), ("bob", 4, 900)],
        ))?;
        for m in [1u32, 2, 3] {
            store.write_aggregate(&subsystem_record(
                "billing",
                Period::Month(Month::new(2025, m).unwrap()),
                &[("bob", 1, 10), ("alice", u64::from(m == 3), 5)],
            ))?;
        }
        store.write_ownership(&ownership("billing", &[("alice", 95), ("bob", 5)], 3))?;

        let badges = collect_badges(&store, 2025, date("2025-03-31"), 3, &BadgeThresholds::default())?;

        let productive = of_kind(&badges, BadgeKind::MostProductive);
        assert_eq!(productive.len(), 1);
        assert_eq!(productive[0].subject, Subject::Developer("alice".into()));

        let maintainers = of_kind(&badges, BadgeKind::TopMaintainer);
        assert_eq!(maintainers.len(), 1);
        assert_eq!(maintainers[0].subject, Subject::Developer("bob".into()));
        assert_eq!(maintainers[0].metric_value, 3.0);

        let owners = of_kind(&badges, BadgeKind::SignificantOwner);
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].subject.id(), "alice");
        assert_eq!(of_kind(&badges, BadgeKind::SubsystemOwner).len(), 1);
        Ok(())
    }

    #[test]
    fn test_dead_subsystem_after_quiet_months() -> Result<(), StoreError> {
        let store = MemorySnapshotStore::new();
        store.write_aggregate(&subsystem_record(
            "legacy",
            Period::Month(Month::new(2024, 10).unwrap()),
            &[("alice", 2, 10)],
        ))?;
        store.write_aggregate(&subsystem_record(
            "api",
            Period::Month(Month::new(2025, 2).unwrap()),
            &[("bob", 1, 1)],
        ))?;
        let known: BTreeSet<String> = ["api", "legacy", "never"].iter().map(|s| s.to_string()).collect();

        let statuses = subsystem_statuses(&store, &known, date("2025-02-20"), 3)?;
        let by_name: BTreeMap<&str, &DeadStatus> =
            statuses.iter().map(|s| (s.subsystem.as_str(), &s.status)).collect();

        assert!(!by_name["api"].is_dead);
        assert_eq!(by_name["api"].months_since_activity, Some(0));
        // Nov, Dec, Jan, Feb without commits.
        assert!(by_name["legacy"].is_dead);
        assert_eq!(by_name["legacy"].months_since_activity, Some(4));
        assert_eq!(by_name["legacy"].last_activity_date, Some(date("2024-10-31")));
        assert!(by_name["never"].is_dead);
        assert_eq!(by_name["never"].months_since_activity, None);
        Ok(())
    }

    #[test]
    fn test_sizes_include_ignored_lines() -> Result<(), StoreError> {
        let store = MemorySnapshotStore::new();
        store.write_ownership(&ownership("a", &[("x", 10)], 90))?;
        store.write_ownership(&ownership("b", &[("x", 50)], 0))?;
        let sizes = subsystem_sizes(&store)?;
        assert_eq!(sizes[0].subsystem, "a");
        assert_eq!(sizes[0].total_lines, 100);
        assert_eq!(sizes[0].bucket, SizeBucket::Big);
        assert_eq!(sizes[1].bucket, SizeBucket::Medium);
        Ok(())
    }
}
