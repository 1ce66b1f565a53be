//! Structural validation of an extracted document.
//!
//! Checks for missing images, undefined references, invalid container
//! names, and malformed external resources before any planning happens.
//! Every finding is recorded; nothing short-circuits.

use std::collections::BTreeSet;

use berth_common::constants::COMMON_NETWORK_DRIVERS;

use super::model::{Document, ResourceDecl};
use crate::diagnostics::{Issue, Report};
use crate::translate::volumes;

/// Validates a document, recording errors and warnings into `report`.
///
/// # Checks performed
///
/// 1. Every service declares `image` or `build`.
/// 2. Every required `depends_on` target is declared (optional ones warn).
/// 3. `container_name` is well formed and not combined with scale > 1.
/// 4. External networks and volumes declare nothing but `name`.
/// 5. Referenced networks and named volumes are declared (warning).
/// 6. Network drivers are from the common set (warning).
pub fn validate(document: &Document, report: &mut Report) {
    tracing::info!("validating compose document");
    check_image_required(document, report);
    check_dependency_references(document, report);
    check_container_names(document, report);
    check_external_resources("network", document.networks.iter(), report);
    check_external_resources("volume", document.volumes.iter(), report);
    check_network_references(document, report);
    check_volume_references(document, report);
    check_network_drivers(document, report);
}

fn check_image_required(document: &Document, report: &mut Report) {
    for service in document.services.values() {
        if service.image.is_none() && service.build.is_none() {
            report.error(Issue::MissingImage {
                service: service.name.clone(),
            });
        }
    }
}

fn check_dependency_references(document: &Document, report: &mut Report) {
    for service in document.services.values() {
        for dep in &service.depends_on {
            if document.services.contains_key(&dep.service) {
                continue;
            }
            let issue = Issue::UndeclaredDependency {
                service: service.name.clone(),
                target: dep.service.clone(),
            };
            if dep.required {
                report.error(issue);
            } else {
                report.warn(issue);
            }
        }
    }
}

/// Matches `^[A-Za-z0-9][A-Za-z0-9_.-]+$`.
fn is_valid_container_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let rest = chars.as_str();
    first.is_ascii_alphanumeric()
        && !rest.is_empty()
        && rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn check_container_names(document: &Document, report: &mut Report) {
    for service in document.services.values() {
        let Some(name) = &service.container_name else {
            continue;
        };
        if !is_valid_container_name(name) {
            report.error(Issue::InvalidContainerName {
                service: service.name.clone(),
                name: name.clone(),
            });
        }
        if let Some(replicas) = service.scale.filter(|&n| n > 1) {
            report.error(Issue::ContainerNameWithScale {
                service: service.name.clone(),
                replicas,
            });
        }
    }
}

fn check_external_resources<'a>(
    kind: &'static str,
    resources: impl Iterator<Item = (&'a String, &'a ResourceDecl)>,
    report: &mut Report,
) {
    for (name, decl) in resources {
        if !decl.external {
            continue;
        }
        let extra = decl.extra_attributes();
        if !extra.is_empty() {
            report.error(Issue::ExternalWithAttributes {
                kind,
                name: name.clone(),
                attributes: extra.join(", "),
            });
        }
    }
}

fn check_network_references(document: &Document, report: &mut Report) {
    for service in document.services.values() {
        for network in service.attached_networks() {
            if !document.networks.contains_key(&network) {
                report.warn(Issue::UndeclaredNetwork {
                    service: service.name.clone(),
                    network,
                });
            }
        }
    }
}

fn check_volume_references(document: &Document, report: &mut Report) {
    for service in document.services.values() {
        let referenced: BTreeSet<String> = service
            .volumes
            .iter()
            .filter_map(volumes::named_source)
            .collect();
        for volume in referenced {
            if !document.volumes.contains_key(&volume) {
                report.warn(Issue::UndeclaredVolume {
                    service: service.name.clone(),
                    volume,
                });
            }
        }
    }
}

fn check_network_drivers(document: &Document, report: &mut Report) {
    for (name, network) in &document.networks {
        let Some(driver) = &network.driver else {
            continue;
        };
        if !COMMON_NETWORK_DRIVERS.contains(&driver.as_str()) {
            report.warn(Issue::UncommonNetworkDriver {
                network: name.clone(),
                driver: driver.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use berth_common::types::ValidationMode;

    use super::*;
    use crate::parser::parse_compose;

    fn report_for(input: &str) -> Report {
        let env: BTreeMap<String, String> = BTreeMap::new();
        parse_compose(input, &env, ValidationMode::Default)
            .expect("should parse")
            .report
    }

    fn messages(issues: &[Issue]) -> Vec<String> {
        issues.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn validate_valid_document_succeeds() {
        let report = report_for(
            "services:\n  api:\n    image: api\n    depends_on: [db]\n  db:\n    image: postgres\n",
        );
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn validate_missing_image_and_build_fails() {
        let report = report_for("services:\n  broken:\n    restart: always\n");
        assert_eq!(
            report.errors,
            vec![Issue::MissingImage {
                service: "broken".into()
            }]
        );
    }

    #[test]
    fn validate_undeclared_dependency_fails() {
        let report = report_for("services:\n  api:\n    image: api\n    depends_on: [ghost]\n");
        let msgs = messages(&report.errors);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("ghost"), "got: {msgs:?}");
    }

    #[test]
    fn validate_optional_undeclared_dependency_warns() {
        let report = report_for(
            "services:\n  api:\n    image: api\n    depends_on:\n      ghost:\n        required: false\n",
        );
        assert!(report.errors.is_empty());
        assert!(messages(&report.warnings).iter().any(|m| m.contains("ghost")));
    }

    #[test]
    fn container_name_pattern() {
        assert!(is_valid_container_name("web-1"));
        assert!(is_valid_container_name("a.b_c"));
        assert!(!is_valid_container_name("a"));
        assert!(!is_valid_container_name("-web"));
        assert!(!is_valid_container_name("web app"));
        assert!(!is_valid_container_name(""));
    }

    #[test]
    fn validate_bad_container_name_fails() {
        let report = report_for("services:\n  web:\n    image: nginx\n    container_name: _web\n");
        assert!(matches!(
            report.errors.as_slice(),
            [Issue::InvalidContainerName { .. }]
        ));
    }

    #[test]
    fn validate_container_name_with_scale_fails() {
        let report = report_for(
            "services:\n  web:\n    image: nginx\n    container_name: web\n    scale: 3\n",
        );
        assert_eq!(
            report.errors,
            vec![Issue::ContainerNameWithScale {
                service: "web".into(),
                replicas: 3
            }]
        );
    }

    #[test]
    fn validate_external_with_attributes_fails() {
        let report = report_for(
            "services:\n  web:\n    image: nginx\nnetworks:\n  default:\n  shared:\n    external: true\n    driver: overlay\nvolumes:\n  data:\n    external: true\n    name: prod_data\n",
        );
        assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
        let msg = report.errors[0].to_string();
        assert!(msg.contains("shared") && msg.contains("driver"), "got: {msg}");
    }

    #[test]
    fn validate_undeclared_references_warn() {
        let report = report_for(
            "services:\n  web:\n    image: nginx\n    networks: [front]\n    volumes:\n      - cache:/var/cache\n      - ./html:/usr/share/nginx/html\n",
        );
        assert!(report.errors.is_empty());
        let msgs = messages(&report.warnings);
        assert!(msgs.iter().any(|m| m.contains("network \"front\"")), "{msgs:?}");
        assert!(msgs.iter().any(|m| m.contains("volume \"cache\"")), "{msgs:?}");
        assert_eq!(msgs.len(), 2, "{msgs:?}");
    }

    #[test]
    fn validate_uncommon_driver_warns() {
        let report = report_for(
            "services:\n  web:\n    image: nginx\nnetworks:\n  default:\n    driver: weave\n",
        );
        assert!(report.errors.is_empty());
        assert!(matches!(
            report.warnings.as_slice(),
            [Issue::UncommonNetworkDriver { .. }]
        ));
    }
}
