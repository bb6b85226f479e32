// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `sweeprun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sweeprun",
    version,
    about = "Launch a mapping server and sweep client workloads against it.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Sweeprun.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Sweeprun.toml")]
    pub config: String,

    /// Run only the named experiment from the config.
    #[arg(long, value_name = "NAME")]
    pub experiment: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SWEEPRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the expanded batches, but launch nothing.
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
