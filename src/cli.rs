// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskforge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskforge",
    version,
    about = "Incrementally rebuild a graph of file-producing tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the task declarations (TOML).
    ///
    /// Default: `Taskforge.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Taskforge.toml")]
    pub config: String,

    /// Build only what is needed to produce this output file.
    ///
    /// Relative paths are resolved against the directory of the config file.
    #[arg(long, value_name = "PATH")]
    pub target: Option<String>,

    /// Maximum number of commands to run in parallel.
    ///
    /// Overrides `[config].jobs`; defaults to the host's available
    /// parallelism.
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKFORGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print which tasks are stale and why, without running anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
