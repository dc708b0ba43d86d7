// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

use crate::params::{ParamValue, parse_assignment};

/// Command-line arguments for `scriptrunner`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scriptrunner",
    version,
    about = "List, inspect and run parameterised scripts from a git repository.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$SCRIPTRUNNER_CONFIG`, else `ScriptRunner.toml` in the
    /// current working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCRIPTRUNNER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List every script in the repository.
    List,

    /// Print one script's metadata as JSON.
    Show { id: String },

    /// Print one script's full text.
    Content { id: String },

    /// Validate parameters, run the script and wait for the result.
    Run {
        id: String,

        /// Parameter assignment; repeat for each parameter.
        #[arg(long = "param", short = 'p', value_name = "NAME=VALUE", value_parser = parse_assignment)]
        params: Vec<(String, ParamValue)>,

        /// Recorded as the user who ran the script.
        ///
        /// Default: `$USER` / `$USERNAME`.
        #[arg(long)]
        user: Option<String>,
    },

    /// Remove stale temp script directories.
    Sweep,
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
