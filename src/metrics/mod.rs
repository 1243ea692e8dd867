//! Derived metrics: badges, liveness and size rankings
//!
//! Everything here is a pure function of stored aggregates and ownership
//! records with explicit windows and thresholds. Nothing is persisted;
//! results are recomputed on every query and are identical for identical
//! inputs.

pub mod badges;
pub mod sizes;
pub mod views;

pub use badges::{
    most_productive, most_productive_team, repository_owners, significant_owners, subsystem_owners,
    top_maintainers, Badge, BadgeKind, BadgeThresholds, Subject,
};
pub use sizes::{size_rankings, SizeBucket, SizeRanking};
pub use views::{collect_badges, subsystem_sizes, subsystem_statuses, SubsystemStatus};
