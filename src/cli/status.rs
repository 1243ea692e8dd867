//! Status command - alive and dead subsystems

use anyhow::{Context, Result};
use chrono::NaiveDate;
use console::style;

use crate::config::CensusConfig;
use crate::metrics::subsystem_statuses;
use crate::store::SnapshotStore;

pub fn run(
    config: &CensusConfig,
    store: &dyn SnapshotStore,
    as_of: NaiveDate,
    threshold: u32,
    json: bool,
) -> Result<()> {
    let known = config.subsystems.configured_subsystems();
    let statuses = subsystem_statuses(store, &known, as_of, threshold)
        .context("Failed to read stored snapshots")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    println!(
        "\nSubsystem status as of {} (dead after {} quiet months)\n",
        style(as_of).bold(),
        threshold
    );
    if statuses.is_empty() {
        println!(
            "  {} Nothing recorded yet. Run {}",
            style("[--]").dim(),
            style("gitcensus update").cyan()
        );
    }
    for entry in &statuses {
        let s = &entry.status;
        let last = match (s.last_activity_date, s.months_since_activity) {
            (Some(date), Some(months)) => format!("last active {} ({} months ago)", date, months),
            _ => "no recorded activity".to_string(),
        };
        let marker = if s.is_dead {
            style("[dead]").red()
        } else {
            style("[live]").green()
        };
        println!("  {} {:<28} {}", marker, entry.subsystem, style(last).dim());
    }

    let dead = statuses.iter().filter(|s| s.status.is_dead).count();
    println!("\n  {} of {} subsystems dead\n", style(dead).cyan(), statuses.len());
    Ok(())
}
