//! CLI command definitions and dispatch.

pub mod config;
pub mod plan;
pub mod project;
pub mod validate;

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

/// Berth — plan compose-style multi-service deployments.
#[derive(Parser, Debug)]
#[command(name = "berth", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Format of diagnostic logs written to stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve the document and print the deployment plan.
    Plan(plan::PlanArgs),
    /// Check the document and print errors and warnings as JSON.
    Validate(validate::ValidateArgs),
    /// Print the interpolated, normalized document as YAML.
    Config(config::ConfigArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Plan(args) => plan::execute(&args),
        Command::Validate(args) => validate::execute(&args),
        Command::Config(args) => config::execute(&args),
    }
}

/// Exit code for a finished run: failure when the document is invalid.
pub(crate) fn exit_code(valid: bool) -> ExitCode {
    if valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
