//! Arguments and loading shared by every command.
//!
//! Locates the compose file, reads it and the environment files, and
//! builds the planner configuration. This is the only place the CLI
//! touches the filesystem; the engine itself receives plain text.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use berth_common::config::PlannerConfig;
use berth_common::constants::{DEFAULT_COMPOSE_FILES, DEFAULT_ENV_FILE};
use berth_common::types::ValidationMode;
use berth_compose::env::{EnvSource, Environment};
use clap::Args;

/// Options locating and configuring a compose project.
#[derive(Args, Debug)]
pub struct ProjectArgs {
    /// Compose file. Discovered in the project directory when omitted.
    #[arg(env = "BERTH_FILE")]
    pub file: Option<PathBuf>,

    /// Profile to activate (repeatable or comma separated).
    #[arg(short = 'p', long = "profile", env = "BERTH_PROFILES", value_delimiter = ',')]
    pub profiles: Vec<String>,

    /// Environment file to read instead of the project's `.env`
    /// (repeatable, later files win).
    #[arg(long)]
    pub env_file: Vec<PathBuf>,

    /// Inline variable as KEY=VALUE, overriding every other source.
    #[arg(short = 'e', long = "env")]
    pub env: Vec<String>,

    /// Treatment of unknown fields: default, strict, or loose.
    #[arg(long, env = "BERTH_MODE", default_value = "default")]
    pub mode: ValidationMode,

    /// Project name scoping named volumes. Overrides the document's
    /// top-level `name`, which in turn overrides the directory name.
    #[arg(long, env = "BERTH_PROJECT_NAME")]
    pub project_name: Option<String>,

    /// Directory relative paths are resolved against. Defaults to the
    /// compose file's directory.
    #[arg(long)]
    pub project_directory: Option<PathBuf>,
}

/// A compose project ready to hand to the engine.
#[derive(Debug)]
pub struct Project {
    /// Path of the compose file.
    pub file: PathBuf,
    /// Its contents.
    pub source: String,
    /// Merged variables for interpolation.
    pub environment: Environment,
    /// Planner settings.
    pub config: PlannerConfig,
}

impl Project {
    /// Locates and reads everything described by `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if no compose file is found, a file cannot be
    /// read, or an inline variable is malformed.
    pub fn load(args: &ProjectArgs) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("cannot determine current directory")?;
        let file = match &args.file {
            Some(file) => cwd.join(file),
            None => discover(args.project_directory.as_deref().unwrap_or(&cwd))?,
        };
        let directory = match &args.project_directory {
            Some(dir) => cwd.join(dir),
            None => file.parent().map_or_else(|| cwd.clone(), Path::to_path_buf),
        };
        tracing::info!(file = %file.display(), directory = %directory.display(), "loading project");

        let source = std::fs::read_to_string(&file)
            .with_context(|| format!("cannot read {}", file.display()))?;

        let mut sources = Vec::new();
        if args.env_file.is_empty() {
            let default_env = directory.join(DEFAULT_ENV_FILE);
            if default_env.is_file() {
                sources.push(EnvSource::File(read_env_file(&default_env)?));
            }
        } else {
            for path in &args.env_file {
                sources.push(EnvSource::File(read_env_file(&cwd.join(path))?));
            }
        }
        sources.push(EnvSource::Process(std::env::vars().collect()));
        sources.push(EnvSource::Inline(parse_inline(&args.env)?));

        let deployment_id = directory
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            file,
            source,
            environment: Environment::from_sources(&sources),
            config: PlannerConfig {
                mode: args.mode,
                working_dir: directory,
                deployment_id,
                project_name: args.project_name.clone(),
                profiles: args.profiles.clone(),
                ..PlannerConfig::default()
            },
        })
    }
}

/// Finds the first well-known compose file name in `directory`.
fn discover(directory: &Path) -> anyhow::Result<PathBuf> {
    DEFAULT_COMPOSE_FILES
        .iter()
        .map(|name| directory.join(name))
        .find(|path| path.is_file())
        .with_context(|| {
            format!(
                "no compose file found in {} (looked for {})",
                directory.display(),
                DEFAULT_COMPOSE_FILES.join(", ")
            )
        })
}

fn read_env_file(path: &Path) -> anyhow::Result<String> {
    tracing::debug!(path = %path.display(), "reading environment file");
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

fn parse_inline(entries: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
            _ => anyhow::bail!("inline variable \"{entry}\" must be KEY=VALUE"),
        })
        .collect()
}
