//! `berth validate` — Check a compose project without printing the plan.

use std::process::ExitCode;

use berth_compose::planner;
use clap::Args;

use super::project::{Project, ProjectArgs};

/// Arguments for the `validate` command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Project location and settings.
    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Executes the `validate` command, printing the result as JSON.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or the file is not a
/// YAML mapping.
pub fn execute(args: &ValidateArgs) -> anyhow::Result<ExitCode> {
    let project = Project::load(&args.project)?;
    let result = planner::validate_source(&project.source, &project.environment, &project.config)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(super::exit_code(result.valid))
}
