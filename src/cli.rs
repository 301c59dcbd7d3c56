// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::Overrides;

/// Command-line arguments for `script-runner`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "script-runner",
    version,
    about = "Run one preconfigured script, stream its output, interrupt it with Ctrl-C.",
    long_about = None
)]
pub struct CliArgs {
    /// Optional config file (TOML) with an `[execution]` section.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Interpreter used to run the script.
    ///
    /// Overrides `EXECUTION_INTERPRETER` and the config file. Default: /bin/sh.
    #[arg(long, value_name = "PATH")]
    pub interpreter: Option<PathBuf>,

    /// Script to run. Overrides `EXECUTION_SCRIPT` and the config file.
    #[arg(long, value_name = "PATH")]
    pub script: Option<PathBuf>,

    /// Run the script as this user (via `sudo -u`).
    ///
    /// Overrides `EXECUTION_USER` and the config file.
    #[arg(long, value_name = "USER")]
    pub user: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCRIPT_RUNNER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the resolved configuration and existence checks, run nothing.
    #[arg(long, conflicts_with = "source")]
    pub check: bool,

    /// Print the script's source code and exit.
    #[arg(long)]
    pub source: bool,
}

impl CliArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            interpreter: self.interpreter.clone(),
            script: self.script.clone(),
            user: self.user.clone(),
        }
    }
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
