//! # berth-compose
//!
//! Resolution and planning engine for compose-style specifications.
//!
//! Handles:
//! - **Env**: `.env` parsing and layered variable lookup.
//! - **Interpolate**: `${VAR}` / `${VAR:-default}` / `$VAR` substitution.
//! - **Parser**: YAML parsing, typed document extraction, normalization, and
//!   structural validation.
//! - **Graph**: Dependency graph construction, cycle detection, and
//!   parallel-safe batching.
//! - **Profiles**: Profile expansion, conflict detection, and per-service
//!   deployability.
//! - **Translate**: Volumes, ports, healthchecks, restart policies, ulimits,
//!   and log config as runtime-ready primitives.
//! - **Planner**: Composition of all of the above into a deployment plan.
//!
//! The engine performs no I/O: callers hand it already-read text.

pub mod diagnostics;
pub mod env;
pub mod graph;
pub mod interpolate;
pub mod parser;
pub mod planner;
pub mod profiles;
pub mod translate;
