//! # berth — compose deployment planner
//!
//! Reads a compose-style document, resolves profiles and dependencies,
//! and prints the deployment plan a runtime would execute.

mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::{Cli, LogFormat};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    commands::execute(cli)
}
