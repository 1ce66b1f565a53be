//! `berth config` — Print the resolved compose document.

use std::process::ExitCode;

use berth_compose::parser::{normalize, parse_compose};
use clap::Args;

use super::project::{Project, ProjectArgs};

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Project location and settings.
    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Executes the `config` command.
///
/// Prints the document after interpolation, with synthesized networks
/// written back in. Errors found while parsing go to stderr.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or the document cannot
/// be parsed or rendered.
pub fn execute(args: &ConfigArgs) -> anyhow::Result<ExitCode> {
    let project = Project::load(&args.project)?;
    let mut parsed = parse_compose(&project.source, &project.environment, project.config.mode)?;
    normalize::sync_networks(&mut parsed.raw, &parsed.document);

    print!("{}", serde_yaml::to_string(&parsed.raw)?);
    for warning in &parsed.report.warnings {
        eprintln!("warning: {warning}");
    }
    for error in &parsed.report.errors {
        eprintln!("error: {error}");
    }
    Ok(super::exit_code(!parsed.report.has_errors()))
}
