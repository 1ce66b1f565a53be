//! Formatted output helpers for CLI commands.
//!
//! Renders deployment plans as text and provides human-readable
//! byte and duration formatting.

use std::fmt::Write;

use berth_compose::planner::DeploymentPlan;
use berth_compose::translate::ServiceRuntime;
use berth_compose::translate::ports::PortBinding;
use berth_compose::translate::restart::{RestartPolicy, RestartPolicyName};
use berth_compose::translate::volumes::{MountKind, MountSpec};

/// Formats a byte count into a human-readable string (e.g., "128.0 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats nanoseconds using the largest unit that divides them evenly.
#[must_use]
pub fn format_nanos(nanos: u64) -> String {
    const UNITS: &[(u64, &str)] = &[
        (3_600_000_000_000, "h"),
        (60_000_000_000, "m"),
        (1_000_000_000, "s"),
        (1_000_000, "ms"),
        (1_000, "us"),
    ];
    UNITS
        .iter()
        .find(|(size, _)| nanos > 0 && nanos % size == 0)
        .map_or_else(|| format!("{nanos}ns"), |(size, unit)| format!("{}{unit}", nanos / size))
}

fn format_port(port: &PortBinding) -> String {
    let target = format!("{}/{}", port.container_port, port.protocol);
    let host = port.host_port_spec();
    match (&port.host_ip, host.is_empty()) {
        (Some(ip), false) => format!("{ip}:{host}->{target}"),
        (Some(ip), true) => format!("{ip}:*->{target}"),
        (None, false) => format!("{host}->{target}"),
        (None, true) => target,
    }
}

fn format_mount(mount: &MountSpec) -> String {
    let kind = match mount.kind {
        MountKind::Bind => "bind",
        MountKind::Volume => "volume",
        MountKind::Tmpfs => "tmpfs",
    };
    let source = mount.source.as_deref().unwrap_or("<anonymous>");
    let mut line = if mount.kind == MountKind::Tmpfs {
        format!("{kind} {}", mount.target)
    } else {
        format!("{kind} {source} -> {}", mount.target)
    };
    if let Some(size) = mount.tmpfs.and_then(|t| t.size_bytes) {
        let _ = write!(line, " ({})", format_bytes(size));
    }
    if mount.read_only {
        line.push_str(" (ro)");
    }
    line
}

fn format_restart(policy: RestartPolicy) -> String {
    match policy.name {
        RestartPolicyName::No => "no".to_owned(),
        RestartPolicyName::Always => "always".to_owned(),
        RestartPolicyName::UnlessStopped => "unless-stopped".to_owned(),
        RestartPolicyName::OnFailure if policy.maximum_retry_count > 0 => {
            format!("on-failure:{}", policy.maximum_retry_count)
        }
        RestartPolicyName::OnFailure => "on-failure".to_owned(),
    }
}

fn render_service(out: &mut String, name: &str, runtime: &ServiceRuntime) {
    let _ = writeln!(out, "  + {name}");
    if !runtime.ports.is_empty() {
        let ports: Vec<String> = runtime.ports.iter().map(format_port).collect();
        let _ = writeln!(out, "      ports: {}", ports.join(", "));
    }
    for mount in runtime.mounts.iter().chain(&runtime.tmpfs) {
        let _ = writeln!(out, "      mount: {}", format_mount(mount));
    }
    if let Some(health) = &runtime.healthcheck {
        if health.is_disabled() {
            out.push_str("      healthcheck: disabled\n");
        } else {
            let _ = write!(out, "      healthcheck: {}", health.test.join(" "));
            if let Some(interval) = health.interval {
                let _ = write!(out, " every {}", format_nanos(interval));
            }
            out.push('\n');
        }
    }
    if runtime.restart.name != RestartPolicyName::No {
        let _ = writeln!(out, "      restart: {}", format_restart(runtime.restart));
    }
    if let Some(logging) = &runtime.logging {
        let _ = writeln!(out, "      logging: {}", logging.driver);
    }
}

/// Renders a plan as a human-readable summary.
#[must_use]
pub fn render_plan(plan: &DeploymentPlan) -> String {
    let mut out = String::new();
    let profiles = if plan.active_profiles.is_empty() {
        "none".to_owned()
    } else {
        plan.active_profiles.join(", ")
    };
    let _ = writeln!(out, "Deployment: {} (profiles: {profiles})", plan.deployment_id);
    out.push('\n');

    for (index, batch) in plan.batches.iter().enumerate() {
        let _ = writeln!(out, "Batch {}: {}", index + 1, batch.join(", "));
        for name in batch {
            if let Some(runtime) = plan.services.get(name) {
                render_service(&mut out, name, runtime);
            }
            for wait in plan.waits.iter().filter(|w| &w.service == name) {
                let _ = writeln!(
                    out,
                    "      waits for {} ({}, {}s)",
                    wait.dependency,
                    wait.condition.as_compose_str(),
                    wait.timeout_secs
                );
            }
        }
    }

    if !plan.services_to_skip.is_empty() {
        out.push_str("\nSkipped:\n");
        for skipped in &plan.services_to_skip {
            let _ = writeln!(out, "  - {}: {}", skipped.name, skipped.reason);
        }
    }
    if !plan.volumes_to_create.is_empty() {
        let _ = writeln!(out, "\nVolumes to create: {}", plan.volumes_to_create.join(", "));
    }
    if !plan.networks_to_create.is_empty() {
        let _ = writeln!(out, "\nNetworks to create: {}", plan.networks_to_create.join(", "));
    }
    if !plan.warnings.is_empty() {
        out.push_str("\nWarnings:\n");
        for warning in &plan.warnings {
            let _ = writeln!(out, "  ! {warning}");
        }
    }
    if !plan.errors.is_empty() {
        out.push_str("\nErrors:\n");
        for error in &plan.errors {
            let _ = writeln!(out, "  x {error}");
        }
    }

    out.push('\n');
    if plan.valid {
        let _ = writeln!(
            out,
            "  {} service(s) will be deployed in {} batch(es).",
            plan.services_to_deploy.len(),
            plan.batches.len()
        );
    } else {
        let _ = writeln!(out, "  Plan is invalid: {} error(s).", plan.errors.len());
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use berth_common::config::PlannerConfig;
    use berth_compose::planner::plan_source;

    use super::*;

    fn plan(input: &str) -> DeploymentPlan {
        let env: BTreeMap<String, String> = BTreeMap::new();
        let config = PlannerConfig {
            working_dir: "/srv".into(),
            ..PlannerConfig::default()
        };
        plan_source(input, &env, &config).expect("should parse")
    }

    #[test]
    fn format_bytes_displays_bytes() {
        assert_eq!(format_bytes(512), "512 B");
    }

    #[test]
    fn format_bytes_displays_kib() {
        assert_eq!(format_bytes(2048), "2.0 KiB");
    }

    #[test]
    fn format_bytes_displays_mib() {
        assert_eq!(format_bytes(134_217_728), "128.0 MiB");
    }

    #[test]
    fn format_bytes_displays_gib() {
        assert_eq!(format_bytes(2_147_483_648), "2.0 GiB");
    }

    #[test]
    fn format_nanos_picks_largest_unit() {
        assert_eq!(format_nanos(30_000_000_000), "30s");
        assert_eq!(format_nanos(90_000_000_000), "90s");
        assert_eq!(format_nanos(120_000_000_000), "2m");
        assert_eq!(format_nanos(1_500_000), "1500us");
        assert_eq!(format_nanos(7), "7ns");
        assert_eq!(format_nanos(0), "0ns");
    }

    #[test]
    fn renders_batches_services_and_waits() {
        let text = render_plan(&plan(
            "services:\n  web:\n    image: nginx\n    ports: [\"127.0.0.1:8080:80\", \"9000-9005:9000\"]\n    tmpfs: [\"/run:size=1m\"]\n    restart: on-failure:2\n    depends_on:\n      db:\n        condition: service_healthy\n  db:\n    image: postgres\n    healthcheck:\n      test: pg_isready\n      interval: 30s\n",
        ));
        assert!(text.contains("Batch 1: db"), "{text}");
        assert!(text.contains("Batch 2: web"), "{text}");
        assert!(text.contains("ports: 127.0.0.1:8080->80/tcp"), "{text}");
        assert!(text.contains("127.0.0.1:8080->80/tcp, 9000-9005->9000/tcp"), "{text}");
        assert!(text.contains("mount: tmpfs /run (1.0 MiB)"), "{text}");
        assert!(text.contains("restart: on-failure:2"), "{text}");
        assert!(text.contains("healthcheck: CMD-SHELL pg_isready every 30s"), "{text}");
        assert!(text.contains("waits for db (service_healthy, 60s)"), "{text}");
        assert!(text.contains("2 service(s) will be deployed in 2 batch(es)."), "{text}");
    }

    #[test]
    fn renders_skips_and_errors() {
        let text = render_plan(&plan(
            "services:\n  a: {image: a, depends_on: [b]}\n  b: {image: b, depends_on: [a]}\n  dbg: {image: d, profiles: [debug]}\n",
        ));
        assert!(text.contains("Skipped:\n  - dbg: requires profile(s) [debug]"), "{text}");
        assert!(text.contains("x circular dependency: a -> b -> a"), "{text}");
        assert!(text.contains("Plan is invalid"), "{text}");
    }
}
