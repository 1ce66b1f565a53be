//! `berth plan` — Display the deployment plan for a compose project.

use std::process::ExitCode;

use berth_compose::planner;
use clap::{Args, ValueEnum};

use super::project::{Project, ProjectArgs};

/// Output format of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    Text,
    /// The full plan as JSON.
    Json,
}

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Project location and settings.
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Executes the `plan` command.
///
/// Parses the compose file, resolves profiles and dependency order, and
/// prints the resulting plan. Exits with failure when the plan is invalid.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or the file is not a
/// YAML mapping.
pub fn execute(args: &PlanArgs) -> anyhow::Result<ExitCode> {
    let project = Project::load(&args.project)?;
    let plan = planner::plan_source(&project.source, &project.environment, &project.config)?;

    match args.format {
        OutputFormat::Text => {
            println!("Deployment Plan for: {}", project.file.display());
            print!("{}", crate::output::render_plan(&plan));
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
    }
    Ok(super::exit_code(plan.valid))
}
