//! Compose document parser built on `serde_yaml`.
//!
//! Transforms raw text into a typed [`Document`] through four phases:
//! YAML parsing, variable interpolation, typed extraction, and
//! normalization plus structural validation.

pub mod model;
pub mod normalize;
pub mod validator;
pub mod value;

use std::collections::BTreeMap;

use berth_common::error::{BerthError, Result};
use berth_common::types::{DependencyCondition, ValidationMode};
use serde_yaml::{Mapping, Value};

use self::model::{BuildRef, Dependency, Document, ProfileRule, ResourceDecl, Service};
use self::value::{as_bool, as_u64, scalar_to_string, string_or_list};
use crate::diagnostics::{Issue, Report};
use crate::env::VariableLookup;
use crate::interpolate;

/// Recognized top-level keys.
pub const TOP_LEVEL_FIELDS: &[&str] = &[
    "version", "name", "include", "services", "networks", "volumes", "configs", "secrets",
    "profiles",
];

/// Recognized service keys.
pub const SERVICE_FIELDS: &[&str] = &[
    "annotations", "attach", "blkio_config", "build", "cap_add", "cap_drop", "cgroup",
    "cgroup_parent", "command", "configs", "container_name", "cpu_count", "cpu_percent",
    "cpu_period", "cpu_quota", "cpu_rt_period", "cpu_rt_runtime", "cpu_shares", "cpus", "cpuset",
    "credential_spec", "depends_on", "deploy", "develop", "device_cgroup_rules", "devices", "dns",
    "dns_opt", "dns_search", "domainname", "entrypoint", "env_file", "environment", "expose",
    "extends", "external_links", "extra_hosts", "gpus", "group_add", "healthcheck", "hostname",
    "image", "init", "ipc", "isolation", "labels", "links", "logging", "mac_address", "mem_limit",
    "mem_reservation", "mem_swappiness", "memswap_limit", "network_mode", "networks",
    "oom_kill_disable", "oom_score_adj", "pid", "pids_limit", "platform", "ports", "post_start",
    "pre_stop", "privileged", "profiles", "pull_policy", "read_only", "restart", "runtime",
    "scale", "secrets", "security_opt", "shm_size", "stdin_open", "stop_grace_period",
    "stop_signal", "storage_opt", "sysctls", "tmpfs", "tty", "ulimits", "user", "userns_mode",
    "uts", "volumes", "volumes_from", "working_dir",
];

/// Recognized network keys.
pub const NETWORK_FIELDS: &[&str] = &[
    "driver", "driver_opts", "attachable", "enable_ipv6", "external", "internal", "ipam",
    "labels", "name",
];

/// Recognized volume keys.
pub const VOLUME_FIELDS: &[&str] = &["driver", "driver_opts", "external", "labels", "name"];

/// A parsed document together with the findings made while parsing it.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// The typed document, best effort when `report` holds errors.
    pub document: Document,
    /// The interpolated tree the document was extracted from.
    pub raw: Value,
    /// Structural errors and warnings.
    pub report: Report,
}

/// Parses a compose document from its source text.
///
/// Variables are substituted through `lookup` before anything else looks
/// at the values. Shape problems are recorded in the returned report;
/// unknown fields are handled according to `mode`.
///
/// # Errors
///
/// Returns an error only if the text is not valid YAML, a `<<` merge key
/// points at something other than a mapping, or the top level is not a
/// mapping.
pub fn parse_compose(
    input: &str,
    lookup: &dyn VariableLookup,
    mode: ValidationMode,
) -> Result<ParsedDocument> {
    tracing::info!(%mode, bytes = input.len(), "parsing compose document");
    let mut raw: Value = serde_yaml::from_str(input)?;
    raw.apply_merge()?;
    interpolate::substitute_value(&mut raw, lookup);

    let mut report = Report::default();
    let mut document = match &raw {
        Value::Mapping(top) => extract_document(top, mode, &mut report),
        Value::Null => {
            report.error(Issue::MissingServices);
            Document::default()
        }
        _ => {
            return Err(BerthError::Config {
                message: "the top level of a compose document must be a mapping".into(),
            });
        }
    };

    if normalize::ensure_default_network(&mut document) {
        tracing::debug!("synthesized default network");
    }
    validator::validate(&document, &mut report);

    tracing::info!(
        services = document.services.len(),
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "compose document parsed"
    );
    Ok(ParsedDocument {
        document,
        raw,
        report,
    })
}

fn invalid(scope: &str, field: &str, message: impl Into<String>) -> Issue {
    Issue::InvalidField {
        scope: scope.to_owned(),
        field: field.to_owned(),
        message: message.into(),
    }
}

fn report_unknown(
    report: &mut Report,
    mode: ValidationMode,
    scope: &str,
    mapping: &Mapping,
    known: &[&str],
) {
    if mode == ValidationMode::Loose {
        return;
    }
    for field in value::unknown_keys(mapping, known) {
        let issue = Issue::UnknownField {
            scope: scope.to_owned(),
            field,
        };
        if mode == ValidationMode::Strict {
            report.error(issue);
        } else {
            report.warn(issue);
        }
    }
}

fn scalar_field(scope: &str, field: &str, value: &Value, report: &mut Report) -> Option<String> {
    let parsed = scalar_to_string(value);
    if parsed.is_none() && !value.is_null() {
        report.error(invalid(scope, field, "expected a scalar value"));
    }
    parsed
}

fn list_field(scope: &str, field: &str, value: &Value, report: &mut Report) -> Vec<String> {
    string_or_list(value).unwrap_or_else(|message| {
        report.error(invalid(scope, field, message));
        Vec::new()
    })
}

fn extract_document(top: &Mapping, mode: ValidationMode, report: &mut Report) -> Document {
    report_unknown(report, mode, "top level", top, TOP_LEVEL_FIELDS);

    let mut document = Document::default();
    let mut saw_services = false;
    for (key, value) in top {
        let Some(key) = key.as_str() else {
            continue;
        };
        match key {
            "name" => document.name = scalar_field("top level", "name", value, report),
            "services" => match value {
                Value::Mapping(services) => {
                    saw_services = true;
                    for (name, body) in services {
                        let Some(name) = scalar_to_string(name) else {
                            continue;
                        };
                        let service = extract_service(&name, body, mode, report);
                        let _ = document.services.insert(name, service);
                    }
                }
                Value::Null => {}
                _ => report.error(invalid("top level", "services", "expected a mapping")),
            },
            "networks" => {
                document.networks = extract_resources("network", value, NETWORK_FIELDS, mode, report);
            }
            "volumes" => {
                document.volumes = extract_resources("volume", value, VOLUME_FIELDS, mode, report);
            }
            "profiles" => document.profiles = extract_profiles(value, report),
            _ => {
                let _ = document.extra.insert(Value::String(key.to_owned()), value.clone());
            }
        }
    }

    if !saw_services {
        report.error(Issue::MissingServices);
    }
    document
}

fn extract_service(name: &str, body: &Value, mode: ValidationMode, report: &mut Report) -> Service {
    let scope = format!("service \"{name}\"");
    let mut service = Service {
        name: name.to_owned(),
        ..Service::default()
    };
    let Some(mapping) = body.as_mapping() else {
        if !body.is_null() {
            report.error(invalid(&scope, "definition", "expected a mapping"));
        }
        return service;
    };
    report_unknown(report, mode, &scope, mapping, SERVICE_FIELDS);

    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            continue;
        };
        match key {
            "image" => service.image = scalar_field(&scope, key, value, report),
            "build" => service.build = extract_build(&scope, value, report),
            "container_name" => service.container_name = scalar_field(&scope, key, value, report),
            "depends_on" => service.depends_on = extract_depends_on(&scope, value, report),
            "profiles" => service.profiles = list_field(&scope, key, value, report),
            "environment" => service.environment = extract_environment(&scope, value, report),
            "env_file" => service.env_file = extract_env_file(&scope, value, report),
            "networks" => service.networks = extract_service_networks(&scope, value, report),
            "network_mode" => service.network_mode = scalar_field(&scope, key, value, report),
            "volumes" => service.volumes = sequence_field(&scope, key, value, report),
            "tmpfs" => service.tmpfs = list_field(&scope, key, value, report),
            "ports" => service.ports = sequence_field(&scope, key, value, report),
            "healthcheck" => service.healthcheck = mapping_field(&scope, key, value, report),
            "restart" => service.restart = scalar_field(&scope, key, value, report),
            "ulimits" => service.ulimits = mapping_field(&scope, key, value, report),
            "logging" => service.logging = mapping_field(&scope, key, value, report),
            "scale" => service.scale = count_field(&scope, key, value, report),
            _ => {
                if key == "deploy" && service.scale.is_none() {
                    if let Some(replicas) = value.get("replicas") {
                        service.scale = count_field(&scope, "deploy.replicas", replicas, report);
                    }
                }
                let _ = service
                    .extra
                    .insert(Value::String(key.to_owned()), value.clone());
            }
        }
    }
    service
}

fn sequence_field(scope: &str, field: &str, value: &Value, report: &mut Report) -> Vec<Value> {
    match value {
        Value::Sequence(items) => items.clone(),
        Value::Null => Vec::new(),
        _ => {
            report.error(invalid(scope, field, "expected a list"));
            Vec::new()
        }
    }
}

fn mapping_field(scope: &str, field: &str, value: &Value, report: &mut Report) -> Option<Value> {
    match value {
        Value::Mapping(_) => Some(value.clone()),
        Value::Null => None,
        _ => {
            report.error(invalid(scope, field, "expected a mapping"));
            None
        }
    }
}

fn count_field(scope: &str, field: &str, value: &Value, report: &mut Report) -> Option<u64> {
    let count = as_u64(value);
    if count.is_none() {
        report.error(invalid(scope, field, "expected a non-negative integer"));
    }
    count
}

fn extract_build(scope: &str, value: &Value, report: &mut Report) -> Option<BuildRef> {
    match value {
        Value::Mapping(build) => Some(BuildRef {
            context: build
                .get("context")
                .and_then(scalar_to_string)
                .unwrap_or_else(|| ".".to_owned()),
            dockerfile: build.get("dockerfile").and_then(scalar_to_string),
        }),
        Value::Null => None,
        other => scalar_field(scope, "build", other, report).map(|context| BuildRef {
            context,
            dockerfile: None,
        }),
    }
}

fn extract_depends_on(scope: &str, value: &Value, report: &mut Report) -> Vec<Dependency> {
    let mut deps = Vec::new();
    match value {
        Value::Null => {}
        Value::Sequence(items) => {
            for item in items {
                match scalar_to_string(item) {
                    Some(name) => deps.push(Dependency::started(name)),
                    None => report.error(invalid(scope, "depends_on", "list items must be names")),
                }
            }
        }
        Value::Mapping(entries) => {
            for (name, options) in entries {
                let Some(name) = scalar_to_string(name) else {
                    continue;
                };
                let mut dep = Dependency::started(name);
                if let Some(raw) = options.get("condition").and_then(scalar_to_string) {
                    match raw.parse::<DependencyCondition>() {
                        Ok(condition) => dep.condition = condition,
                        Err(message) => report.error(invalid(scope, "depends_on", message)),
                    }
                }
                dep.restart = options.get("restart").and_then(as_bool).unwrap_or(false);
                dep.required = options.get("required").and_then(as_bool).unwrap_or(true);
                deps.push(dep);
            }
        }
        _ => report.error(invalid(scope, "depends_on", "expected a list or a mapping")),
    }
    deps
}

fn extract_environment(
    scope: &str,
    value: &Value,
    report: &mut Report,
) -> BTreeMap<String, Option<String>> {
    let mut env = BTreeMap::new();
    match value {
        Value::Null => {}
        Value::Sequence(items) => {
            for item in items {
                let Some(entry) = scalar_to_string(item) else {
                    report.error(invalid(scope, "environment", "list items must be KEY=VALUE"));
                    continue;
                };
                let (key, val) = match entry.split_once('=') {
                    Some((k, v)) => (k.to_owned(), Some(v.to_owned())),
                    None => (entry, None),
                };
                let _ = env.insert(key, val);
            }
        }
        Value::Mapping(entries) => {
            for (key, val) in entries {
                if let Some(key) = scalar_to_string(key) {
                    let _ = env.insert(key, scalar_to_string(val));
                }
            }
        }
        _ => report.error(invalid(scope, "environment", "expected a list or a mapping")),
    }
    env
}

fn extract_env_file(scope: &str, value: &Value, report: &mut Report) -> Vec<String> {
    match value {
        Value::Sequence(items) => items
            .iter()
            .filter_map(|item| {
                item.get("path")
                    .and_then(scalar_to_string)
                    .or_else(|| scalar_to_string(item))
            })
            .collect(),
        other => list_field(scope, "env_file", other, report),
    }
}

fn extract_service_networks(scope: &str, value: &Value, report: &mut Report) -> Vec<String> {
    match value {
        Value::Mapping(entries) => value::mapping_keys(entries).collect(),
        other => list_field(scope, "networks", other, report),
    }
}

fn extract_resources(
    kind: &'static str,
    value: &Value,
    known: &[&str],
    mode: ValidationMode,
    report: &mut Report,
) -> BTreeMap<String, ResourceDecl> {
    let mut resources = BTreeMap::new();
    let entries = match value {
        Value::Mapping(entries) => entries,
        Value::Null => return resources,
        _ => {
            report.error(invalid("top level", &format!("{kind}s"), "expected a mapping"));
            return resources;
        }
    };

    for (name, body) in entries {
        let Some(name) = scalar_to_string(name) else {
            continue;
        };
        let scope = format!("{kind} \"{name}\"");
        let mut decl = ResourceDecl::default();
        match body {
            Value::Null => {}
            Value::Mapping(mapping) => {
                report_unknown(report, mode, &scope, mapping, known);
                decl.driver = mapping.get("driver").and_then(scalar_to_string);
                decl.name = mapping.get("name").and_then(scalar_to_string);
                match mapping.get("external") {
                    Some(Value::Mapping(legacy)) => {
                        decl.external = true;
                        if decl.name.is_none() {
                            decl.name = legacy.get("name").and_then(scalar_to_string);
                        }
                    }
                    Some(flag) => decl.external = as_bool(flag).unwrap_or(false),
                    None => {}
                }
                decl.raw = mapping.clone();
            }
            _ => report.error(invalid(&scope, "definition", "expected a mapping")),
        }
        let _ = resources.insert(name, decl);
    }
    resources
}

fn extract_profiles(value: &Value, report: &mut Report) -> BTreeMap<String, ProfileRule> {
    let mut profiles = BTreeMap::new();
    match value {
        Value::Null => {}
        Value::Sequence(_) => {
            for name in list_field("top level", "profiles", value, report) {
                let _ = profiles.insert(name, ProfileRule::default());
            }
        }
        Value::Mapping(entries) => {
            for (name, body) in entries {
                let Some(name) = scalar_to_string(name) else {
                    continue;
                };
                let scope = format!("profile \"{name}\"");
                let mut rule = ProfileRule::default();
                if let Some(deps) = body.get("depends_on").or_else(|| body.get("dependsOn")) {
                    rule.depends_on = list_field(&scope, "depends_on", deps, report);
                }
                if let Some(conflicts) = body.get("conflicts") {
                    rule.conflicts = list_field(&scope, "conflicts", conflicts, report);
                }
                let _ = profiles.insert(name, rule);
            }
        }
        _ => report.error(invalid("top level", "profiles", "expected a list or a mapping")),
    }
    profiles
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn parse(input: &str) -> ParsedDocument {
        parse_with(input, ValidationMode::Default)
    }

    fn parse_with(input: &str, mode: ValidationMode) -> ParsedDocument {
        let env: BTreeMap<String, String> = BTreeMap::new();
        parse_compose(input, &env, mode).expect("should parse")
    }

    #[test]
    fn parse_minimal_service() {
        let parsed = parse("services:\n  web:\n    image: nginx:1.27\n");
        assert!(parsed.report.errors.is_empty(), "{:?}", parsed.report);
        let web = &parsed.document.services["web"];
        assert_eq!(web.name, "web");
        assert_eq!(web.image.as_deref(), Some("nginx:1.27"));
    }

    #[test]
    fn parse_applies_interpolation_before_extraction() {
        let mut env = BTreeMap::new();
        let _ = env.insert("TAG".to_owned(), "16".to_owned());
        let parsed = parse_compose(
            "services:\n  db:\n    image: postgres:${TAG}\n    restart: ${POLICY:-always}\n",
            &env,
            ValidationMode::Default,
        )
        .expect("parse");
        let db = &parsed.document.services["db"];
        assert_eq!(db.image.as_deref(), Some("postgres:16"));
        assert_eq!(db.restart.as_deref(), Some("always"));
    }

    #[test]
    fn parse_depends_on_short_and_long_forms() {
        let parsed = parse(
            r"
services:
  web:
    image: web
    depends_on:
      db:
        condition: service_healthy
        restart: true
      cache:
        condition: service_started
        required: false
  worker:
    image: worker
    depends_on: [db]
  db:
    image: postgres
",
        );
        let web = &parsed.document.services["web"];
        assert_eq!(web.depends_on.len(), 2);
        let db = web.depends_on.iter().find(|d| d.service == "db").expect("db");
        assert_eq!(db.condition, DependencyCondition::Healthy);
        assert!(db.restart);
        let cache = web.depends_on.iter().find(|d| d.service == "cache").expect("cache");
        assert!(!cache.required);

        let worker = &parsed.document.services["worker"];
        assert_eq!(worker.depends_on, vec![Dependency::started("db")]);
    }

    #[test]
    fn parse_invalid_condition_is_an_error() {
        let parsed = parse(
            "services:\n  a:\n    image: a\n    depends_on:\n      b:\n        condition: ready\n  b:\n    image: b\n",
        );
        assert!(
            parsed
                .report
                .errors
                .iter()
                .any(|e| e.to_string().contains("unknown dependency condition"))
        );
    }

    #[test]
    fn parse_environment_list_and_map() {
        let parsed = parse(
            "services:\n  a:\n    image: a\n    environment: [A=1, B]\n  b:\n    image: b\n    environment:\n      C: 3\n      D:\n",
        );
        let a = &parsed.document.services["a"].environment;
        assert_eq!(a.get("A"), Some(&Some("1".to_owned())));
        assert_eq!(a.get("B"), Some(&None));
        let b = &parsed.document.services["b"].environment;
        assert_eq!(b.get("C"), Some(&Some("3".to_owned())));
        assert_eq!(b.get("D"), Some(&None));
    }

    #[test]
    fn parse_profiles_string_or_list() {
        let parsed = parse(
            "services:\n  a:\n    image: a\n    profiles: debug\n  b:\n    image: b\n    profiles: [prod, staging]\n",
        );
        assert_eq!(parsed.document.services["a"].profiles, vec!["debug"]);
        assert_eq!(parsed.document.services["b"].profiles, vec!["prod", "staging"]);
    }

    #[test]
    fn parse_top_level_profile_rules() {
        let parsed = parse(
            r"
services:
  a:
    image: a
profiles:
  prod:
    depends_on: [monitoring]
    conflicts: [dev]
  monitoring:
  dev:
    dependsOn: tools
",
        );
        let profiles = &parsed.document.profiles;
        assert_eq!(profiles["prod"].depends_on, vec!["monitoring"]);
        assert_eq!(profiles["prod"].conflicts, vec!["dev"]);
        assert_eq!(profiles["monitoring"], ProfileRule::default());
        assert_eq!(profiles["dev"].depends_on, vec!["tools"]);
    }

    #[test]
    fn parse_scale_from_deploy_replicas() {
        let parsed = parse("services:\n  a:\n    image: a\n    deploy:\n      replicas: 3\n");
        let a = &parsed.document.services["a"];
        assert_eq!(a.scale, Some(3));
        assert!(a.extra.contains_key("deploy"));
    }

    #[test]
    fn parse_unknown_fields_follow_mode() {
        let input = "services:\n  a:\n    image: a\n    colour: blue\n    x-note: fine\nbogus: 1\n";

        let default = parse_with(input, ValidationMode::Default);
        assert!(default.report.errors.is_empty());
        assert_eq!(default.report.warnings.len(), 2);

        let strict = parse_with(input, ValidationMode::Strict);
        assert_eq!(strict.report.errors.len(), 2);

        let loose = parse_with(input, ValidationMode::Loose);
        assert!(loose.report.errors.is_empty());
        assert!(loose.report.warnings.is_empty());
        assert!(loose.document.services["a"].extra.contains_key("colour"));
    }

    #[test]
    fn parse_missing_services_is_structural_error() {
        let parsed = parse("volumes:\n  data:\n");
        assert!(parsed.report.errors.contains(&Issue::MissingServices));

        let empty = parse("");
        assert!(empty.report.errors.contains(&Issue::MissingServices));
    }

    #[test]
    fn parse_rejects_non_mapping_top_level() {
        let env: BTreeMap<String, String> = BTreeMap::new();
        assert!(parse_compose("- a\n- b\n", &env, ValidationMode::Default).is_err());
        assert!(parse_compose("services: [", &env, ValidationMode::Default).is_err());
    }

    #[test]
    fn parse_external_legacy_form() {
        let parsed = parse(
            "services:\n  a:\n    image: a\nvolumes:\n  shared:\n    external:\n      name: team_shared\n",
        );
        let shared = &parsed.document.volumes["shared"];
        assert!(shared.external);
        assert_eq!(shared.name.as_deref(), Some("team_shared"));
    }

    #[test]
    fn parse_build_string_or_mapping() {
        let parsed = parse(
            "services:\n  a:\n    build: ./a\n  b:\n    build:\n      context: ./b\n      dockerfile: Dockerfile.dev\n",
        );
        let a = parsed.document.services["a"].build.as_ref().expect("build a");
        assert_eq!(a.context, "./a");
        let b = parsed.document.services["b"].build.as_ref().expect("build b");
        assert_eq!(b.dockerfile.as_deref(), Some("Dockerfile.dev"));
        assert!(parsed.report.errors.is_empty());
    }

    #[test]
    fn parse_resolves_merge_keys_from_anchors() {
        let parsed = parse_with(
            r"
x-base: &base
  image: nginx:alpine
  restart: always
services:
  web:
    <<: *base
    restart: on-failure
",
            ValidationMode::Strict,
        );
        assert!(parsed.report.errors.is_empty(), "{:?}", parsed.report);
        assert!(parsed.report.warnings.is_empty(), "{:?}", parsed.report);
        let web = &parsed.document.services["web"];
        assert_eq!(web.image.as_deref(), Some("nginx:alpine"));
        assert_eq!(web.restart.as_deref(), Some("on-failure"));
    }
}
