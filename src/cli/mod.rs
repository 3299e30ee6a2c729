//! CLI module for the verdict test runner
//!
//! ## Commands
//!
//! - `run [path]` - Discover, build and verify tests
//! - `list [path]` - Print the discovered test tree
//! - `check <file>` - Report diagnostics for one definition file
//! - `driver <file>` - Write the dispatch driver for an embedded-signature file
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::catalog::NodeId;
use crate::version::VERDICT_VERSION;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Discover, build and verify tests for native programs
#[derive(Parser, Debug)]
#[command(name = "verdict")]
#[command(version = VERDICT_VERSION)]
#[command(about = "Discover, build and verify tests for native programs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Where settings come from; shared by every command that runs or discovers tests.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Settings file (default: ./verdict.toml when present)
    #[arg(long = "settings", value_name = "FILE")]
    pub settings_file: Option<PathBuf>,
    /// Override one setting, e.g. `--set memcheck.enabled=false`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Console,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover, build and verify tests
    Run {
        /// Definition file or directory to search
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,
        /// Only run cases whose name contains this keyword
        #[arg(short = 'k', value_name = "KEYWORD")]
        filter: Option<String>,
        /// Only run these files, groups or cases (`file[::Group/case]`)
        #[arg(long = "only", value_name = "ID")]
        only: Vec<NodeId>,
        /// Skip these files, groups or cases (`file[::Group/case]`)
        #[arg(long = "exclude", value_name = "ID")]
        exclude: Vec<NodeId>,
        /// Report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
        format: ReportFormat,
        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Print the discovered test tree
    List {
        /// Definition file or directory to search
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Report diagnostics for a definition file
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Write the dispatch driver for an embedded-signature file
    Driver {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Output path (default: the configured driver file)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
        #[command(flatten)]
        settings: SettingsArgs,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Run {
            path,
            filter,
            only,
            exclude,
            format,
            verbose,
            settings,
        } => commands::run_tests(commands::RunOptions {
            path,
            filter,
            only,
            exclude,
            format,
            verbose,
            settings,
        }),
        Command::List { path, settings } => commands::list_tests(&path, &settings),
        Command::Check { file } => commands::check_file(&file),
        Command::Driver { file, output, settings } => commands::write_driver(&file, output.as_deref(), &settings),
    }
}

// ============================================================================
// Tests
// ============================================================================
