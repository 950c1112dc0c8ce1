// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `pipedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipedag",
    version,
    about = "Rerun only the pipeline tasks whose inputs changed.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    ///
    /// Task actions run in the directory that holds it.
    #[arg(long, global = true, value_name = "PATH", default_value = "Pipedag.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPEDAG_LOG` or `info` is used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the tasks `make` would run, with the reason for each.
    Plan(TargetArgs),
    /// Run the stale tasks needed to bring the target up to date.
    Make {
        #[command(flatten)]
        target: TargetArgs,
        /// Maximum number of actions running at once (overrides `jobs`).
        #[arg(long, short = 'j', value_name = "N")]
        jobs: Option<usize>,
    },
    /// Show the state of every task.
    Show,
    /// Record stale tasks as up to date without running them.
    Touch(TargetArgs),
    /// List the task definitions.
    List,
}

#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Task to bring up to date; `full` (the default) means every task.
    #[arg(value_name = "TARGET")]
    pub target: Option<String>,

    /// Treat the target as stale even if it is up to date.
    #[arg(long)]
    pub force: bool,
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
