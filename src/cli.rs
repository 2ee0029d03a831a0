use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::output::OutputMode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project root; defaults to the current directory
    #[arg(long = "root")]
    pub root: Option<PathBuf>,

    /// Configuration file, relative to the root unless absolute
    #[arg(short = 'f', long = "file", default_value = "dodo.toml")]
    pub file: PathBuf,

    /// Enable verbose output (same as --log-level debug)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Log level, overrides DODO_LOG
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Override number of worker threads for parallel execution
    #[arg(short = 'j', long = "workers")]
    pub workers: Option<usize>,

    /// Show what would be executed without running tasks
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Continue executing independent tasks even if some fail
    #[arg(long = "continue-on-failure")]
    pub continue_on_failure: bool,

    /// How to display task output in the terminal
    #[arg(long = "output", value_enum)]
    pub output: Option<OutputMode>,

    /// List available tasks and exit
    #[arg(long = "list", conflicts_with_all = ["forget", "dry_run"])]
    pub list: bool,

    /// Forget the recorded state of the given tasks so they run next time
    #[arg(long = "forget")]
    pub forget: bool,

    /// Tasks or task groups to run; runs the default tasks if empty
    pub tasks: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> Cli {
    Cli::parse()
}
