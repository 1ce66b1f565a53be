//! Deployment planning.
//!
//! Composes profile resolution, dependency resolution and field
//! translation into one [`DeploymentPlan`] for the runtime-invocation
//! layer.

use std::collections::{BTreeMap, BTreeSet};

use berth_common::config::PlannerConfig;
use berth_common::error::{BerthError, Result};
use berth_common::types::{DependencyCondition, DeploymentId};
use serde::Serialize;

use crate::diagnostics::{Issue, Report, ValidationResult};
use crate::env::VariableLookup;
use crate::graph;
use crate::parser::model::Document;
use crate::parser::{ParsedDocument, parse_compose};
use crate::profiles::{self, Decision};
use crate::translate::{self, ServiceRuntime, TranslateContext, volumes};

/// A service left out of the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedService {
    /// Service name.
    pub name: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Tells the runtime layer to wait for `dependency` before starting
/// `service`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitDirective {
    /// Dependent service.
    pub service: String,
    /// Service waited for.
    pub dependency: String,
    /// Condition to observe.
    pub condition: DependencyCondition,
    /// How long to wait before giving up.
    pub timeout_secs: u64,
}

/// The resolved, ordered, filtered deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPlan {
    /// Deployment ID scoping runtime resources.
    pub deployment_id: String,
    /// `false` when any error was recorded.
    pub valid: bool,
    /// Flat start order.
    pub services_to_deploy: Vec<String>,
    /// Parallel-safe groups in dependency order.
    pub batches: Vec<Vec<String>>,
    /// Services left out, with reasons.
    pub services_to_skip: Vec<SkippedService>,
    /// Declared, non-external volumes referenced by deployable services.
    pub volumes_to_create: Vec<String>,
    /// Declared, non-external networks referenced by deployable services.
    pub networks_to_create: Vec<String>,
    /// Non-fatal findings.
    pub warnings: Vec<String>,
    /// Fatal findings.
    pub errors: Vec<String>,
    /// `true` if any dependency cycle was found.
    pub has_circular: bool,
    /// Every cycle found.
    pub cycles: Vec<Vec<String>>,
    /// Profiles active in this run.
    pub active_profiles: Vec<String>,
    /// Services scheduled despite depending on a skipped service.
    pub flagged: Vec<String>,
    /// Per-dependency wait directives.
    pub waits: Vec<WaitDirective>,
    /// Runtime primitives per deployable service.
    pub services: BTreeMap<String, ServiceRuntime>,
    /// Structured findings behind `warnings` and `errors`.
    #[serde(skip)]
    pub report: Report,
}

impl DeploymentPlan {
    /// Returns the plan's findings as a [`ValidationResult`].
    #[must_use]
    pub fn validation(&self) -> ValidationResult {
        self.report.to_validation()
    }

    fn finish(mut self, report: Report) -> Self {
        let validation = report.to_validation();
        self.valid = validation.valid;
        self.errors = validation.errors;
        self.warnings = validation.warnings;
        self.report = report;
        self
    }
}

/// Plans the deployment of an already parsed document.
///
/// Structural errors recorded while parsing stop planning early: the
/// returned plan carries them and nothing else. Any other error still
/// yields the best-effort plan, marked invalid.
#[must_use]
pub fn plan(parsed: &ParsedDocument, config: &PlannerConfig) -> DeploymentPlan {
    let document = &parsed.document;
    let deployment_id = DeploymentId::new(
        config
            .project_name
            .as_deref()
            .or(document.name.as_deref())
            .unwrap_or(&config.deployment_id),
    );
    let mut report = parsed.report.clone();
    let mut plan = DeploymentPlan {
        deployment_id: deployment_id.to_string(),
        ..DeploymentPlan::default()
    };
    if report.has_errors() {
        tracing::warn!(errors = report.errors.len(), "structural errors, skipping planning");
        return plan.finish(report);
    }
    tracing::info!(%deployment_id, profiles = ?config.profiles, "planning deployment");

    let resolved = profiles::resolve_profiles(document, &config.profiles);
    report.absorb(resolved.report);
    let mut deployable = BTreeSet::new();
    for (name, decision) in profiles::decide_all(document, &resolved.active) {
        match decision {
            Decision::Deploy { matched } => {
                tracing::debug!(service = %name, ?matched, "service selected");
                let _ = deployable.insert(name);
            }
            Decision::Skip { reason } => {
                tracing::debug!(service = %name, %reason, "service skipped");
                plan.services_to_skip.push(SkippedService { name, reason });
            }
        }
    }
    plan.active_profiles = resolved.active.into_iter().collect();
    plan.flagged = flag_skipped_dependencies(document, &deployable, &mut report);

    let resolution = graph::resolve(document, &deployable);
    report.absorb(resolution.report);
    plan.services_to_deploy = resolution.order;
    plan.batches = resolution.batches;
    plan.cycles = resolution.cycles;
    plan.has_circular = resolution.has_circular;

    plan.waits = document
        .dependency_edges()
        .into_iter()
        .filter(|edge| deployable.contains(&edge.from) && deployable.contains(&edge.to))
        .map(|edge| WaitDirective {
            timeout_secs: config.timeouts.for_condition(edge.condition),
            service: edge.from,
            dependency: edge.to,
            condition: edge.condition,
        })
        .collect();

    plan.volumes_to_create = volumes_to_create(document, &deployable);
    plan.networks_to_create = networks_to_create(document, &deployable);

    let ctx = TranslateContext {
        working_dir: &config.working_dir,
        deployment_id: &deployment_id,
        declared_volumes: &document.volumes,
    };
    for name in &deployable {
        let Some(service) = document.services.get(name) else {
            continue;
        };
        match translate::translate_service(service, &ctx) {
            Ok(runtime) => {
                let _ = plan.services.insert(name.clone(), runtime);
            }
            Err(err) => report.error(translation_issue(name, err)),
        }
    }

    let plan = plan.finish(report);
    tracing::info!(
        valid = plan.valid,
        batches = plan.batches.len(),
        skipped = plan.services_to_skip.len(),
        "deployment planned"
    );
    plan
}

/// Parses `input` and plans it in one step.
///
/// # Errors
///
/// Returns an error if the input is not YAML or not a mapping.
pub fn plan_source(
    input: &str,
    lookup: &dyn VariableLookup,
    config: &PlannerConfig,
) -> Result<DeploymentPlan> {
    let parsed = parse_compose(input, lookup, config.mode)?;
    Ok(plan(&parsed, config))
}

/// Parses and plans `input`, returning only the findings.
///
/// # Errors
///
/// Returns an error if the input is not YAML or not a mapping.
pub fn validate_source(
    input: &str,
    lookup: &dyn VariableLookup,
    config: &PlannerConfig,
) -> Result<ValidationResult> {
    plan_source(input, lookup, config).map(|plan| plan.validation())
}

/// Warns about deployable services whose required dependencies are skipped
/// and returns those services.
fn flag_skipped_dependencies(
    document: &Document,
    deployable: &BTreeSet<String>,
    report: &mut Report,
) -> Vec<String> {
    let mut flagged = Vec::new();
    for name in deployable {
        let Some(service) = document.services.get(name) else {
            continue;
        };
        for dep in &service.depends_on {
            let skipped =
                document.services.contains_key(&dep.service) && !deployable.contains(&dep.service);
            if skipped && dep.required {
                report.warn(Issue::SkippedDependency {
                    service: name.clone(),
                    dependency: dep.service.clone(),
                });
                if flagged.last() != Some(name) {
                    flagged.push(name.clone());
                }
            }
        }
    }
    flagged
}

fn volumes_to_create(document: &Document, deployable: &BTreeSet<String>) -> Vec<String> {
    let referenced: BTreeSet<String> = deployable
        .iter()
        .filter_map(|name| document.services.get(name))
        .flat_map(|service| service.volumes.iter().filter_map(volumes::named_source))
        .collect();
    referenced
        .into_iter()
        .filter(|name| document.volumes.get(name).is_some_and(|v| !v.external))
        .collect()
}

fn networks_to_create(document: &Document, deployable: &BTreeSet<String>) -> Vec<String> {
    let referenced: BTreeSet<String> = deployable
        .iter()
        .filter_map(|name| document.services.get(name))
        .flat_map(|service| service.attached_networks())
        .collect();
    referenced
        .into_iter()
        .filter(|name| document.networks.get(name).is_some_and(|n| !n.external))
        .collect()
}

fn translation_issue(service: &str, err: BerthError) -> Issue {
    let scope = format!("service \"{service}\"");
    match err {
        BerthError::InvalidField { field, message } => Issue::InvalidField {
            scope,
            field,
            message,
        },
        other => Issue::InvalidField {
            scope,
            field: "runtime".to_owned(),
            message: other.to_string(),
        },
    }
}
