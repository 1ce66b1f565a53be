//! Typed in-memory representation of a compose document.
//!
//! Fields the engine reasons about are extracted into typed members.
//! Declarative fields consumed by the translators (`volumes`, `ports`,
//! `healthcheck`, ...) stay as raw values, and unknown keys are retained in
//! `extra` so nothing is lost on the way through.

use std::collections::{BTreeMap, BTreeSet};

use berth_common::constants::DEFAULT_NETWORK_NAME;
use berth_common::types::DependencyCondition;
use serde_yaml::{Mapping, Value};

/// Root node of a parsed compose document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Top-level `name` (the project name), if declared.
    pub name: Option<String>,
    /// Service definitions keyed by name.
    pub services: BTreeMap<String, Service>,
    /// Network declarations keyed by name.
    pub networks: BTreeMap<String, Network>,
    /// Volume declarations keyed by name.
    pub volumes: BTreeMap<String, Volume>,
    /// Profile-to-profile rules declared at the top level.
    pub profiles: BTreeMap<String, ProfileRule>,
    /// Top-level keys the engine does not interpret.
    pub extra: Mapping,
}

impl Document {
    /// Derives one edge per declared dependency whose target exists.
    ///
    /// Edges are returned sorted by dependent, then dependency.
    #[must_use]
    pub fn dependency_edges(&self) -> Vec<DependencyEdge> {
        let mut edges: Vec<DependencyEdge> = self
            .services
            .values()
            .flat_map(|service| {
                service
                    .depends_on
                    .iter()
                    .filter(|dep| self.services.contains_key(&dep.service))
                    .map(|dep| DependencyEdge {
                        from: service.name.clone(),
                        to: dep.service.clone(),
                        condition: dep.condition,
                    })
            })
            .collect();
        edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        edges
    }

    /// Every profile name mentioned by a service or a declaration.
    #[must_use]
    pub fn known_profiles(&self) -> BTreeSet<String> {
        let mut known: BTreeSet<String> = self.profiles.keys().cloned().collect();
        for rule in self.profiles.values() {
            known.extend(rule.depends_on.iter().cloned());
            known.extend(rule.conflicts.iter().cloned());
        }
        for service in self.services.values() {
            known.extend(service.profiles.iter().cloned());
        }
        known
    }
}

/// Image build reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRef {
    /// Build context path or URL.
    pub context: String,
    /// Dockerfile path relative to the context.
    pub dockerfile: Option<String>,
}

/// One declared dependency of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Name of the service depended upon.
    pub service: String,
    /// Condition to wait for.
    pub condition: DependencyCondition,
    /// Restart the dependent when the dependency restarts.
    pub restart: bool,
    /// `false` when the dependency may be absent.
    pub required: bool,
}

impl Dependency {
    /// Short-syntax dependency: condition `started`, required.
    pub fn started(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            condition: DependencyCondition::Started,
            restart: false,
            required: true,
        }
    }
}

/// A derived dependency edge: `from` waits for `to` to reach `condition`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    /// Dependent service.
    pub from: String,
    /// Dependency.
    pub to: String,
    /// Condition `from` waits for.
    pub condition: DependencyCondition,
}

/// A service definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Service {
    /// Service name (its key in `services`).
    pub name: String,
    /// Image reference.
    pub image: Option<String>,
    /// Build reference.
    pub build: Option<BuildRef>,
    /// Fixed container name.
    pub container_name: Option<String>,
    /// Declared dependencies.
    pub depends_on: Vec<Dependency>,
    /// Profiles gating this service; empty means always deployed.
    pub profiles: Vec<String>,
    /// Environment entries; `None` values are passed through from the host.
    pub environment: BTreeMap<String, Option<String>>,
    /// Environment files the calling layer should read.
    pub env_file: Vec<String>,
    /// Explicitly attached networks.
    pub networks: Vec<String>,
    /// `network_mode`, which replaces network attachment.
    pub network_mode: Option<String>,
    /// Raw volume declarations (short strings or long mappings).
    pub volumes: Vec<Value>,
    /// Raw service-level tmpfs entries (`target[:options]`).
    pub tmpfs: Vec<String>,
    /// Raw port declarations (numbers, short strings, long mappings).
    pub ports: Vec<Value>,
    /// Raw healthcheck mapping.
    pub healthcheck: Option<Value>,
    /// Raw restart policy string.
    pub restart: Option<String>,
    /// Raw ulimits mapping.
    pub ulimits: Option<Value>,
    /// Raw logging mapping.
    pub logging: Option<Value>,
    /// Replica count from `scale` or `deploy.replicas`.
    pub scale: Option<u64>,
    /// Keys the engine does not interpret.
    pub extra: Mapping,
}

impl Service {
    /// Returns `true` if the service declares an enabled healthcheck.
    #[must_use]
    pub fn has_healthcheck(&self) -> bool {
        let Some(hc) = &self.healthcheck else {
            return false;
        };
        if hc.get("disable").and_then(super::value::as_bool) == Some(true) {
            return false;
        }
        match hc.get("test") {
            Some(Value::String(s)) => s != "NONE",
            Some(Value::Sequence(items)) => items.first().and_then(Value::as_str) != Some("NONE"),
            _ => true,
        }
    }

    /// Networks the service is attached to, including the implicit
    /// default network when none is listed and no `network_mode` is set.
    #[must_use]
    pub fn attached_networks(&self) -> Vec<String> {
        if self.network_mode.is_some() {
            Vec::new()
        } else if self.networks.is_empty() {
            vec![DEFAULT_NETWORK_NAME.to_owned()]
        } else {
            self.networks.clone()
        }
    }
}

/// A network or volume declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceDecl {
    /// Driver name.
    pub driver: Option<String>,
    /// Managed outside this deployment.
    pub external: bool,
    /// Explicit runtime name.
    pub name: Option<String>,
    /// The declaration as written.
    pub raw: Mapping,
}

impl ResourceDecl {
    /// Declared keys other than `external` and `name`.
    #[must_use]
    pub fn extra_attributes(&self) -> Vec<String> {
        super::value::mapping_keys(&self.raw)
            .filter(|k| k != "external" && k != "name")
            .collect()
    }
}

/// A top-level network declaration.
pub type Network = ResourceDecl;

/// A top-level volume declaration.
pub type Volume = ResourceDecl;

/// Rules attached to a declared profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileRule {
    /// Profiles activated alongside this one.
    pub depends_on: Vec<String>,
    /// Profiles that may not be active together with this one.
    pub conflicts: Vec<String>,
}
