// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `gatedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "gatedag",
    version,
    about = "Plan a request into a task DAG, run each task once its dependencies pass, and synthesize the results.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$GATEDAG_CONFIG`, else `gatedag.toml` in the current
    /// working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The request to run. Read from stdin when omitted.
    #[arg(long, value_name = "TEXT")]
    pub query: Option<String>,

    /// Use this plan file (JSON) instead of running the `[planner]` command.
    #[arg(long, value_name = "PATH")]
    pub plan: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `GATEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Decode and validate the plan, print its rounds, but don't execute any
    /// task.
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
