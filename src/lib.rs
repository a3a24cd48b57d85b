//! Cli/daemon pair for measuring how much active time you spend in programs
//! you register. The daemon polls the foreground window and input idle time,
//! turns the stream of samples into non-overlapping time entries on disk, and
//! the cli shows per-program totals for a day.
//!

pub mod aggregate;
pub mod cli;
pub mod daemon;
pub mod probe;
pub mod utils;
