// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskmux`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskmux",
    version,
    about = "Run tasks with dependencies, triggers, and file watches.",
    long_about = None
)]
pub struct CliArgs {
    /// The task to run, along with its dependencies.
    #[arg(value_name = "TASK")]
    pub task: Option<String>,

    /// Look for a root task file in the given directory.
    #[arg(long, value_name = "PATH", default_value = ".")]
    pub dir: String,

    /// Display the task list and exit. With a task id, only that task's
    /// subtree is shown.
    #[arg(long)]
    pub list: bool,

    /// Force a particular UI.
    #[arg(long, value_enum, value_name = "KIND", default_value = "printer")]
    pub ui: UiKind,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKMUX_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Available UIs. There is only the interleaved printer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum UiKind {
    Printer,
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
