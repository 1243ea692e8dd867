//! CLI command definitions and handlers

mod badges;
mod check;
mod show;
mod sizes;
mod status;
mod update;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{load_config, CensusConfig, SettingsOverrides};
use crate::models::EntityKind;
use crate::period::{Month, Period};
use crate::store::FsSnapshotStore;

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// gitcensus - who changed what, where, and who owns it now
#[derive(Parser, Debug)]
#[command(name = "gitcensus")]
#[command(
    version,
    about = "Aggregate git history and blame across many repositories into developer, team and subsystem statistics",
    after_help = "\
Examples:
  gitcensus check                         Validate the configuration directory
  gitcensus update                        This year so far: history, years, ownership
  gitcensus update --year 2024            A whole past year
  gitcensus update --from 2025-01 --to 2025-03 --no-blame
  gitcensus show subsystem billing        Yearly summary of one subsystem
  gitcensus badges --year 2024            Badges earned in 2024
  gitcensus status --threshold 6          Subsystems without commits for 6 months
  gitcensus sizes                         Big / medium / small subsystems"
)]
pub struct Cli {
    /// Configuration directory (gitcensus.toml, services.json, teams.json, ...)
    #[arg(long, global = true, default_value = "configuration", env = "GITCENSUS_CONFIG_DIR")]
    pub config_dir: PathBuf,

    /// Root under which stats/ is written (overrides the configuration)
    #[arg(long, global = true)]
    pub output_root: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Number of parallel workers (1-64)
    #[arg(long, global = true, value_parser = parse_workers)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract history and blame, then write snapshots
    #[command(after_help = "\
Without a range, processes January of the current year through the current month.")]
    Update {
        /// First month (YYYY-MM)
        #[arg(long, conflicts_with = "year")]
        from: Option<Month>,

        /// Last month (YYYY-MM)
        #[arg(long, conflicts_with = "year")]
        to: Option<Month>,

        /// A whole year (up to the current month for the current year)
        #[arg(long)]
        year: Option<i32>,

        /// Skip history extraction and the year roll-up
        #[arg(long)]
        no_history: bool,

        /// Skip blame and ownership
        #[arg(long)]
        no_blame: bool,

        /// Compute everything but keep it in memory
        #[arg(long)]
        dry_run: bool,

        /// Treat this date as today (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration and the configured repositories
    Check,

    /// Show one stored record
    Show {
        /// developer, team or subsystem
        kind: EntityKind,

        /// Entity id (slug, team id or subsystem name)
        id: String,

        /// YYYY, YYYY-MM or a period label (default: current year)
        #[arg(long)]
        period: Option<Period>,

        /// Show current ownership instead of activity (subsystems only)
        #[arg(long)]
        ownership: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute badges from stored snapshots
    Badges {
        /// Year for yearly badges (default: year of --as-of)
        #[arg(long)]
        year: Option<i32>,

        /// End of the rolling maintainer window (default: today)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which subsystems are alive and which are dead
    Status {
        /// Reference date (default: today)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Months without commits before a subsystem is dead
        #[arg(long)]
        threshold: Option<u32>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rank subsystems by size
    Sizes {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            repos_root: None,
            output_root: self.output_root.clone(),
            workers: self.workers,
        }
    }

    /// Load and validate the configuration directory.
    fn load_config(&self) -> Result<CensusConfig> {
        load_config(&self.config_dir, &self.overrides()).with_context(|| {
            format!("Invalid configuration in {}", self.config_dir.display())
        })
    }
}

/// Snapshot store of a loaded configuration.
fn open_store(config: &CensusConfig) -> FsSnapshotStore {
    FsSnapshotStore::new(&config.settings.stats_root())
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Update {
            from,
            to,
            year,
            no_history,
            no_blame,
            dry_run,
            as_of,
            json,
        } => {
            let config = cli.load_config()?;
            let now = as_of.unwrap_or_else(today);
            let (first, last) = update::resolve_range(*from, *to, *year, now)?;
            update::run(
                &config,
                update::UpdateOptions {
                    first,
                    last,
                    history: !no_history,
                    blame: !no_blame,
                    dry_run: *dry_run,
                    json: *json,
                },
            )
        }

        Commands::Check => check::run(&cli.config_dir, &cli.overrides()),

        Commands::Show {
            kind,
            id,
            period,
            ownership,
            json,
        } => {
            let config = cli.load_config()?;
            let period = period.unwrap_or_else(|| Period::Year(today().year()));
            show::run(&open_store(&config), *kind, id, period, *ownership, *json)
        }

        Commands::Badges { year, as_of, json } => {
            let config = cli.load_config()?;
            let as_of = as_of.unwrap_or_else(today);
            let year = year.unwrap_or(as_of.year());
            badges::run(&config, &open_store(&config), year, as_of, *json)
        }

        Commands::Status {
            as_of,
            threshold,
            json,
        } => {
            let config = cli.load_config()?;
            let as_of = as_of.unwrap_or_else(today);
            let threshold = threshold.unwrap_or(config.settings.dead_threshold_months);
            status::run(&config, &open_store(&config), as_of, threshold, *json)
        }

        Commands::Sizes { json } => {
            let config = cli.load_config()?;
            sizes::run(&open_store(&config), *json)
        }
    }
}
