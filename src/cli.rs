// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `simflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "simflow",
    version,
    about = "Run dependency-driven simulation workflows and convergence studies.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow file (TOML).
    ///
    /// Default: `Simflow.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Simflow.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SIMFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build the workflow described by the config file, run it and write
    /// `results.json` into its working directory.
    Run,

    /// Parse + validate, print tasks and links, but don't execute anything.
    DryRun,

    /// Print the status of a previously saved workflow.
    Status {
        /// Working directory of the workflow (the one holding `__workflow__.json`).
        workdir: PathBuf,
    },
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
