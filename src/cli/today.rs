use std::{
    collections::HashMap,
    fmt::Display,
    io::{Write, stdout},
    path::{Path, PathBuf},
    time::Duration,
};

use ansi_term::{Colour, Style};
use anyhow::Result;
use chrono::{FixedOffset, Local, NaiveDate, Offset, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};

use crate::{
    aggregate::{DaySummary, summarize_day},
    daemon::storage::{
        entities::ProgramId, entry_store::LocalEntryStore, registry::ProgramRegistry,
    },
    utils::time::{duration_percent, format_clock},
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct TodayCommand {
    #[arg(
        long,
        help = "Day to summarize. Examples are \"yesterday\", \"2 days ago\", \"15/03/2025\". Defaults to today"
    )]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(short, long, help = "Only count one program, by its registered name")]
    program: Option<String>,
    #[arg(
        short,
        long,
        help = "Keep the totals on screen, refreshing every second"
    )]
    watch: bool,
}

/// Command to process `today`. Shows how much tracked time a day holds and
/// which program, if any, is being timed right now.
pub async fn process_today_command(
    app_dir: PathBuf,
    TodayCommand {
        date,
        date_style,
        program,
        watch,
    }: TodayCommand,
) -> Result<()> {
    let programs = ProgramRegistry::new(&app_dir).programs()?;

    let filter = match &program {
        Some(name) => match programs.iter().find(|p| &p.name == name) {
            Some(found) => Some(found.id),
            None => {
                return Err(Args::command()
                    .error(
                        clap::error::ErrorKind::ValueValidation,
                        format!("No program named {name:?} is registered"),
                    )
                    .into());
            }
        },
        None => None,
    };

    let day = match date.map(|s| parse_date_string(&s, Local::now(), date_style.into())) {
        Some(Ok(v)) => v.date_naive(),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate date {e}"),
                )
                .into());
        }
        None => Local::now().date_naive(),
    };

    let offset = Local::now().offset().fix();
    let names = programs
        .iter()
        .map(|p| (p.id, p.name.clone()))
        .collect::<HashMap<_, _>>();

    if watch {
        watch_loop(&app_dir, day, offset, filter, &names).await
    } else {
        let summary = load_summary(&app_dir, day, offset, filter).await?;
        print_summary(&summary, &names);
        Ok(())
    }
}

async fn load_summary(
    app_dir: &Path,
    day: NaiveDate,
    offset: FixedOffset,
    filter: Option<ProgramId>,
) -> Result<DaySummary> {
    let store = LocalEntryStore::new(app_dir.join("records"))?;
    summarize_day(store, day, offset, filter, Utc::now()).await
}

/// Re-reads and redraws the totals once a second, the terminal stand-in for
/// the original always-on counter window.
async fn watch_loop(
    app_dir: &Path,
    day: NaiveDate,
    offset: FixedOffset,
    filter: Option<ProgramId>,
    names: &HashMap<ProgramId, String>,
) -> Result<()> {
    let mut refresh = tokio::time::interval(Duration::from_secs(1));
    loop {
        refresh.tick().await;
        let summary = load_summary(app_dir, day, offset, filter).await?;
        print!(
            "\r{}  {}        ",
            status_line(&summary, names),
            Style::new().bold().paint(format_clock(summary.total)),
        );
        stdout().flush()?;
    }
}

fn print_summary(summary: &DaySummary, names: &HashMap<ProgramId, String>) {
    println!("{}", status_line(summary, names));
    println!(
        "{} total",
        Style::new().bold().paint(format_clock(summary.total))
    );

    if summary.ranked.is_empty() {
        return;
    }
    println!();
    for entry in &summary.ranked {
        println!(
            "{}\t{}%\t{}",
            format_clock(entry.duration),
            duration_percent(entry.duration, summary.total),
            display_name(entry.program, names),
        );
    }
}

fn status_line(summary: &DaySummary, names: &HashMap<ProgramId, String>) -> String {
    match summary.open.first() {
        Some(program) => Colour::Green
            .paint(format!("Tracking {}", display_name(*program, names)))
            .to_string(),
        None => Colour::Yellow.paint("Currently paused").to_string(),
    }
}

/// Entries can outlive their program's registration; fall back to the id.
fn display_name(program: ProgramId, names: &HashMap<ProgramId, String>) -> String {
    names
        .get(&program)
        .cloned()
        .unwrap_or_else(|| format!("program {program}"))
}
