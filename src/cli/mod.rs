pub mod daemon_path;
pub mod process;
pub mod programs;
pub mod today;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use process::{restart_daemon, stop_daemon};
use programs::AddCommand;
use today::{TodayCommand, process_today_command};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{config, start_daemon, storage::registry::ProgramRegistry},
    utils::{
        dir::create_application_default_path,
        logging::{CLI_PREFIX, enable_logging},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Timekeep", version, long_about = None)]
#[command(about = "Measures active time spent in registered programs", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Start (or restart) the tracking daemon")]
    Init {},
    #[command(
        about = "Run the daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Stop the currently running daemon")]
    Stop {},
    #[command(about = "Register a program to track")]
    Add(AddCommand),
    #[command(about = "Remove a registered program")]
    Remove {
        /// Display name the program was registered under.
        name: String,
    },
    #[command(about = "List registered programs")]
    Programs {},
    #[command(about = "Show tracked totals for a day")]
    Today(TodayCommand),
    #[command(about = "Show or change settings")]
    Config {
        #[arg(long, help = "Seconds of no input before tracking pauses")]
        idle_timeout: Option<u64>,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let app_dir = create_application_default_path()?;
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Init {} => restart_daemon(),
        Commands::Stop {} => stop_daemon(),
        Commands::Serve { dir } => start_daemon(dir.unwrap_or(app_dir)).await,
        Commands::Add(command) => {
            programs::process_add_command(&ProgramRegistry::new(&app_dir), command)
        }
        Commands::Remove { name } => {
            programs::process_remove_command(&ProgramRegistry::new(&app_dir), &name)
        }
        Commands::Programs {} => programs::process_list_command(&ProgramRegistry::new(&app_dir)),
        Commands::Today(command) => process_today_command(app_dir, command).await,
        Commands::Config { idle_timeout } => process_config_command(&app_dir, idle_timeout),
    }
}

fn process_config_command(app_dir: &Path, idle_timeout: Option<u64>) -> Result<()> {
    match idle_timeout {
        Some(seconds) => {
            let mut current = config::load_or_create(app_dir);
            current.mouse_timeout = seconds;
            config::store(app_dir, &current)?;
            println!("Idle timeout set to {seconds}s. Restart the daemon to apply it.");
        }
        None => {
            let current = config::load_or_create(app_dir);
            println!("mouse_timeout = {}s", current.mouse_timeout);
        }
    }
    Ok(())
}
