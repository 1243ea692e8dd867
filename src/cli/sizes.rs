//! Sizes command - rank subsystems by current line count

use anyhow::{Context, Result};
use console::style;

use crate::metrics::{subsystem_sizes, SizeBucket};
use crate::store::SnapshotStore;

pub fn run(store: &dyn SnapshotStore, json: bool) -> Result<()> {
    let rankings = subsystem_sizes(store).context("Failed to read stored ownership")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rankings)?);
        return Ok(());
    }

    println!("\nSubsystem sizes\n");
    if rankings.is_empty() {
        println!(
            "  {} No ownership recorded. Run {}",
            style("[--]").dim(),
            style("gitcensus update").cyan()
        );
    }
    for r in &rankings {
        let bucket = match r.bucket {
            SizeBucket::Big => style(r.bucket.to_string()).red(),
            SizeBucket::Medium => style(r.bucket.to_string()).yellow(),
            SizeBucket::Small => style(r.bucket.to_string()).green(),
        };
        println!(
            "  {:>3}. {:<28} {:>10} lines  {:>6.2}%  {}",
            r.rank, r.subsystem, r.total_lines, r.share, bucket
        );
    }
    println!();
    Ok(())
}
