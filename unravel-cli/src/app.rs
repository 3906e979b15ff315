use std::path::PathBuf;

use clap::Parser;
use unravel::deobfuscation::Verbosity;

/// unravel - static JavaScript deobfuscation
#[derive(Debug, Parser)]
#[command(name = "unravel", version, about, long_about = None)]
pub struct Cli {
    /// Path to the obfuscated script.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Remove unreferenced declarations after deobfuscation.
    #[arg(short, long)]
    pub clean: bool,

    /// Suppress progress output.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Show per-rule timing and change counts.
    #[arg(short, long)]
    pub verbose: bool,

    /// Write the result to a file instead of stdout (default: <INPUT>-deob.js).
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<Option<PathBuf>>,

    /// Maximum main loop iterations.
    #[arg(short, long, value_name = "N")]
    pub max_iterations: Option<usize>,

    /// Write a JSON run report.
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

impl Cli {
    /// Engine reporting level selected by `--quiet` / `--verbose`.
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Error
        } else if self.verbose {
            Verbosity::Debug
        } else {
            Verbosity::Log
        }
    }

    /// Log filter matching [`Cli::verbosity`].
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbosity() {
            Verbosity::None => log::LevelFilter::Off,
            Verbosity::Error => log::LevelFilter::Warn,
            Verbosity::Log => log::LevelFilter::Info,
            Verbosity::Debug => log::LevelFilter::Debug,
        }
    }
}
