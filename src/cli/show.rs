//! Show command - print one stored record

use anyhow::{bail, Context, Result};
use console::style;
use std::collections::BTreeMap;

use crate::aggregate::{Activity, AggregateRecord};
use crate::models::EntityKind;
use crate::ownership::OwnershipRecord;
use crate::period::Period;
use crate::store::{SnapshotStore, SnapshotStoreExt, StoreError};

const TOP: usize = 10;

pub fn run(
    store: &dyn SnapshotStore,
    kind: EntityKind,
    id: &str,
    period: Period,
    ownership: bool,
    json: bool,
) -> Result<()> {
    if ownership {
        if kind != EntityKind::Subsystem {
            bail!("ownership is only recorded for subsystems");
        }
        let record = match store.read_ownership(id) {
            Err(StoreError::NotFound(_)) => bail!("no ownership recorded for subsystem '{}'", id),
            other => other?,
        };
        if json {
            println!("{}", serde_json::to_string_pretty(&record)?);
        } else {
            print_ownership(&record);
        }
        return Ok(());
    }

    let record = match store.read_aggregate(kind, id, period) {
        Err(StoreError::NotFound(_)) => bail!("no {} '{}' recorded for {}", kind, id, period),
        other => other.with_context(|| format!("Failed to read {} '{}'", kind, id))?,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(())
}

fn print_record(record: &AggregateRecord) {
    let name = record.display_name.as_deref().unwrap_or(&record.id);
    println!(
        "\n{} {} ({})\n",
        style(record.kind).dim(),
        style(name).bold(),
        style(record.period.label()).dim()
    );
    println!("  Commits:        {}", style(record.commits).cyan());
    println!(
        "  Lines:          {} / {} (net {})",
        style(format!("+{}", record.lines_added)).green(),
        style(format!("-{}", record.lines_deleted)).red(),
        record.net_lines
    );
    if record.unmeasurable_changes > 0 {
        println!("  Binary changes: {}", record.unmeasurable_changes);
    }
    if let Some(top) = &record.top_developer {
        println!("  Top developer:  {}", style(top).cyan());
    }
    if !record.responsible_teams.is_empty() {
        let teams: Vec<&str> = record.responsible_teams.iter().map(String::as_str).collect();
        println!("  Responsible:    {}", teams.join(", "));
    }

    print_breakdown("Subsystems", &record.subsystems);
    print_breakdown("Developers", &record.developers);
    if record.per_repo.len() > 1 {
        print_breakdown("Repositories", &record.per_repo);
    }
    if !record.languages.is_empty() {
        println!("\n  Languages");
        let mut languages: Vec<_> = record.languages.iter().collect();
        languages.sort_by(|a, b| {
            (b.1.additions + b.1.deletions)
                .cmp(&(a.1.additions + a.1.deletions))
                .then_with(|| a.0.cmp(b.0))
        });
        for (language, totals) in languages.into_iter().take(TOP) {
            println!(
                "    {:<20} +{:<8} -{}",
                language, totals.additions, totals.deletions
            );
        }
    }
    println!();
}

fn print_breakdown(title: &str, entries: &BTreeMap<String, Activity>) {
    if entries.is_empty() {
        return;
    }
    println!("\n  {}", title);
    let mut sorted: Vec<_> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        b.1.changed_lines()
            .cmp(&a.1.changed_lines())
            .then_with(|| a.0.cmp(b.0))
    });
    for (name, activity) in sorted.iter().take(TOP) {
        println!(
            "    {:<28} {:>5} commits  +{:<8} -{}",
            name, activity.commits, activity.additions, activity.deletions
        );
    }
    if sorted.len() > TOP {
        println!("    {}", style(format!("... and {} more", sorted.len() - TOP)).dim());
    }
}

fn print_ownership(record: &OwnershipRecord) {
    println!("\n{} {}\n", style("ownership").dim(), style(&record.subsystem).bold());
    println!(
        "  Lines:   {} counted, {} by ignored authors",
        style(record.total_lines).cyan(),
        record.ignored_lines
    );
    for (repo, head) in &record.as_of {
        println!("  As of:   {} {}", repo, style(&head[..head.len().min(10)]).dim());
    }
    if record.per_repo.len() > 1 {
        println!("\n  Repositories");
        for (repo, part) in &record.per_repo {
            println!(
                "    {:<28} {:>8} lines  top {}",
                repo,
                part.total_lines,
                style(part.top_owner.as_deref().unwrap_or("-")).cyan()
            );
        }
    }
    println!();
    let mut owners: Vec<_> = record.developers.iter().collect();
    owners.sort_by(|a, b| b.1.lines_owned.cmp(&a.1.lines_owned).then_with(|| a.0.cmp(b.0)));
    for (dev, share) in owners.into_iter().take(TOP) {
        let marker = if record.significant_owners().iter().any(|(d, _)| *d == dev.as_str()) {
            style("*").green()
        } else {
            style(" ").dim()
        };
        println!(
            "  {} {:<28} {:>8} lines  {:>6.2}%",
            marker, dev, share.lines_owned, share.percentage
        );
    }
    println!();
}
