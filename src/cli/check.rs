//! Check command - validate configuration and environment

use anyhow::{bail, Result};
use console::style;
use std::path::Path;

use crate::config::{load_config, SettingsOverrides};
use crate::exec::is_tool_installed;
use crate::git::head_commit;

pub fn run(config_dir: &Path, overrides: &SettingsOverrides) -> Result<()> {
    println!("\ngitcensus check: {}\n", style(config_dir.display()).cyan());

    let config = match load_config(config_dir, overrides) {
        Ok(config) => config,
        Err(errors) => {
            for e in &errors.0 {
                println!("  {} {}", style("[error]").red(), e);
            }
            bail!("{} configuration error(s)", errors.0.len());
        }
    };

    for warning in &config.warnings {
        println!("  {} {}", style("[warn]").yellow(), warning);
    }

    println!(
        "  {} {} identities, {} teams, {} configured subsystems",
        style("[OK]").green(),
        config.identities.identities().count(),
        config.teams.len(),
        config.subsystems.configured_subsystems().len()
    );

    let mut usable = 0;
    for repo in &config.repos {
        match head_commit(&repo.path) {
            Ok(head) => {
                usable += 1;
                println!(
                    "  {} {} at {}",
                    style("[OK]").green(),
                    style(&repo.name).cyan(),
                    style(&head[..head.len().min(10)]).dim()
                );
            }
            Err(e) => println!("  {} {}: {}", style("[--]").red(), style(&repo.name).cyan(), e),
        }
    }

    if is_tool_installed("git") {
        println!("  {} git", style("[OK]").green());
    } else {
        println!("  {} git not found on PATH", style("[error]").red());
    }
    if !config.settings.languages {
        println!("  {} cloc disabled by settings", style("[--]").dim());
    } else if is_tool_installed("cloc") {
        println!("  {} cloc", style("[OK]").green());
    } else {
        println!("  {} cloc not found; languages will be Unknown", style("[--]").yellow());
    }
    println!();

    if config.repos.is_empty() {
        bail!("no repositories configured or found under {}", config.settings.repos_root.display());
    }
    if usable == 0 {
        bail!("none of the {} repositories is usable", config.repos.len());
    }
    Ok(())
}
