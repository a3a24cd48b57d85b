use std::path::PathBuf;

use anyhow::Result;
use chrono::{Local, Utc};
use clap::Parser;

use crate::daemon::storage::registry::ProgramRegistry;

#[derive(Debug, Parser)]
pub struct AddCommand {
    /// Display name shown in listings and totals.
    name: String,
    #[arg(
        long,
        help = "Process name matched against the foreground executable, e.g. \"firefox\""
    )]
    process: String,
    #[arg(long, help = "Path to the executable. Kept for reference only")]
    location: Option<PathBuf>,
}

pub fn process_add_command(registry: &ProgramRegistry, command: AddCommand) -> Result<()> {
    let program = registry.add(
        &command.name,
        &command.process,
        command.location,
        Utc::now(),
    )?;
    println!(
        "Registered {} (matches process \"{}\")",
        program.name, program.process_name
    );
    Ok(())
}

pub fn process_remove_command(registry: &ProgramRegistry, name: &str) -> Result<()> {
    let removed = registry.remove(name)?;
    println!("Removed {}. Its recorded time stays on disk.", removed.name);
    Ok(())
}

pub fn process_list_command(registry: &ProgramRegistry) -> Result<()> {
    let programs = registry.programs()?;
    if programs.is_empty() {
        println!("No programs registered yet. Add one with `timekeep add`.");
        return Ok(());
    }

    for program in programs {
        let location = program
            .location
            .map(|v| v.display().to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{}\t{}\t{}\tadded {}",
            program.name,
            program.process_name,
            location,
            program.added_at.with_timezone(&Local).format("%x")
        );
    }
    Ok(())
}
