//! Update command - run the census and write snapshots

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use console::style;
use indicatif::MultiProgress;
use tracing::{debug, warn};

use super::open_store;
use crate::config::CensusConfig;
use crate::period::{months_to_date, Month};
use crate::pipeline::{CancelToken, Pipeline, RunReport};
use crate::store::{MemorySnapshotStore, SnapshotStore};

pub(super) struct UpdateOptions {
    pub first: Month,
    pub last: Month,
    pub history: bool,
    pub blame: bool,
    pub dry_run: bool,
    pub json: bool,
}

/// Months to process from the command line flags.
///
/// `--year` covers that year up to `today`; `--from` alone runs to the
/// current month; `--to` alone starts in January of its year; nothing at
/// all means the current year to date.
pub(super) fn resolve_range(
    from: Option<Month>,
    to: Option<Month>,
    year: Option<i32>,
    today: NaiveDate,
) -> Result<(Month, Month)> {
    let current = Month::of(today);
    let (first, last) = match (from, to, year) {
        (_, _, Some(year)) => {
            let months = months_to_date(year, today);
            match (months.first(), months.last()) {
                (Some(first), Some(last)) => (*first, *last),
                _ => bail!("{} has not started yet", year),
            }
        }
        (Some(from), Some(to), None) => (from, to),
        (Some(from), None, None) => (from, current),
        (None, Some(to), None) => (Month { year: to.year, month: 1 }, to),
        (None, None, None) => (Month { year: today.year(), month: 1 }, current),
    };
    if first > last {
        bail!("--from {} is after --to {}", first, last);
    }
    if last > current {
        bail!("{} is in the future", last);
    }
    Ok((first, last))
}

/// Cancel `token` on Ctrl-C. The watcher thread lives until the process exits.
fn cancel_on_ctrl_c(token: CancelToken) {
    let spawned = std::thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("Ctrl-C handling unavailable: {}", e);
                    return;
                }
            };
            rt.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nCancelling: finishing units in flight, keeping written snapshots...");
                    token.cancel();
                }
            });
        });
    if let Err(e) = spawned {
        warn!("Ctrl-C handling unavailable: {}", e);
    }
}

pub(super) fn run(config: &CensusConfig, options: UpdateOptions) -> Result<()> {
    let memory;
    let fs;
    let store: &dyn SnapshotStore = if options.dry_run {
        memory = MemorySnapshotStore::new();
        &memory
    } else {
        fs = open_store(config);
        std::fs::create_dir_all(fs.root())
            .with_context(|| format!("Failed to create {}", fs.root().display()))?;
        &fs
    };

    let cancel = CancelToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut pipeline = Pipeline::new(config, store)
        .dry_run(options.dry_run)
        .with_cancel(cancel);
    if options.history {
        pipeline = pipeline.with_months(options.first, options.last);
    } else {
        pipeline = pipeline.without_history();
    }
    if !options.blame {
        pipeline = pipeline.without_blame();
    }
    if !options.json {
        pipeline = pipeline.with_progress(MultiProgress::new());
        println!(
            "\n{} {} repositories, {} to {}{}\n",
            style("gitcensus").bold(),
            style(config.repos.len()).cyan(),
            style(options.first).cyan(),
            style(options.last).cyan(),
            if options.dry_run { " (dry run)" } else { "" }
        );
    }

    let report = pipeline.run()?;
    debug!("Run {} took {}", report.run_id, report.finished_at - report.started_at);

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, config);
    }

    if report.cancelled {
        bail!("run cancelled");
    }
    if report.timed_out {
        bail!("run exceeded the job timeout of {}s", config.settings.job_timeout_secs);
    }
    Ok(())
}

fn print_report(report: &RunReport, config: &CensusConfig) {
    for warning in &report.warnings {
        println!("  {} {}", style("[warn]").yellow(), warning);
    }
    for excluded in &report.excluded {
        println!(
            "  {} {} excluded: {}",
            style("[skip]").red(),
            style(&excluded.repo).cyan(),
            excluded.reason
        );
    }
    for skipped in &report.skipped {
        println!("  {} {}: {}", style("[skip]").yellow(), skipped.unit, skipped.reason);
    }

    let status = if report.is_complete() {
        style("[OK]").green()
    } else {
        style("[!!]").yellow()
    };
    println!("\n  {} {}", status, report.summary());
    if !report.dry_run {
        println!(
            "      snapshots in {}",
            style(config.settings.stats_root().display()).dim()
        );
    }
    println!();
}
