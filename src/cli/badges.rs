//! Badges command - compute badges from stored snapshots

use anyhow::{Context, Result};
use chrono::NaiveDate;
use console::style;

use crate::config::CensusConfig;
use crate::metrics::{collect_badges, Badge, BadgeKind, BadgeThresholds, Subject};
use crate::store::SnapshotStore;

pub fn run(
    config: &CensusConfig,
    store: &dyn SnapshotStore,
    year: i32,
    as_of: NaiveDate,
    json: bool,
) -> Result<()> {
    let thresholds = BadgeThresholds::default();
    let badges = collect_badges(
        store,
        year,
        as_of,
        config.settings.maintainer_window_months,
        &thresholds,
    )
    .context("Failed to read stored snapshots")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&badges)?);
        return Ok(());
    }

    println!("\nBadges for {} (as of {})\n", style(year).bold(), as_of);
    if badges.is_empty() {
        println!("  {} No badges earned. Run {} first?", style("[--]").dim(), style("gitcensus update").cyan());
    }
    for badge in &badges {
        println!("  {}", describe(badge));
    }
    println!();
    Ok(())
}

fn describe(badge: &Badge) -> String {
    let who = match &badge.subject {
        Subject::Developer(id) => style(id.clone()).cyan().to_string(),
        Subject::Team(id) => format!("team {}", style(id).cyan()),
    };
    let detail = match badge.kind {
        BadgeKind::MostProductive => format!("{} lines added", badge.metric_value),
        BadgeKind::TopMaintainer => format!("{} commits", badge.metric_value),
        BadgeKind::SignificantOwner | BadgeKind::SubsystemOwner | BadgeKind::RepositoryOwner => {
            format!("{:.2}% of lines", badge.metric_value)
        }
    };
    match badge.subsystem.as_ref().or(badge.repository.as_ref()) {
        Some(place) => format!(
            "{:<18} {} in {} ({})",
            badge.kind.to_string(),
            who,
            style(place).bold(),
            detail
        ),
        None => format!("{:<18} {} ({})", badge.kind.to_string(), who, detail),
    }
}
