//! Translation of declarative service fields into runtime-ready primitives.
//!
//! Every translator is a pure function: same input, same output, no shared
//! state. Invalid input is reported through [`berth_common::error::Result`].

pub mod duration;
pub mod healthcheck;
pub mod logging;
pub mod ports;
pub mod restart;
pub mod ulimits;
pub mod volumes;

use std::collections::BTreeMap;
use std::path::Path;

use berth_common::error::Result;
use berth_common::types::DeploymentId;
use serde::Serialize;

use self::healthcheck::HealthcheckSpec;
use self::logging::LogConfig;
use self::ports::{HostBinding, PortBinding};
use self::restart::RestartPolicy;
use self::ulimits::Ulimit;
use self::volumes::{MountSet, MountSpec};
use crate::parser::model::{Service, Volume};

/// Deployment-wide inputs the translators need.
#[derive(Debug, Clone, Copy)]
pub struct TranslateContext<'a> {
    /// Directory relative bind sources are resolved against.
    pub working_dir: &'a Path,
    /// Deployment ID scoping named volumes.
    pub deployment_id: &'a DeploymentId,
    /// Volumes declared in the document.
    pub declared_volumes: &'a BTreeMap<String, Volume>,
}

/// All runtime primitives for one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRuntime {
    /// Bind and volume mounts.
    pub mounts: Vec<MountSpec>,
    /// tmpfs mounts, created through a separate runtime path.
    pub tmpfs: Vec<MountSpec>,
    /// Normalized port bindings.
    pub ports: Vec<PortBinding>,
    /// Port bindings folded into the runtime's `"<port>/<proto>"` map.
    pub port_map: BTreeMap<String, Vec<HostBinding>>,
    /// Healthcheck, if declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthcheckSpec>,
    /// Restart policy.
    pub restart: RestartPolicy,
    /// Resource limits.
    pub ulimits: Vec<Ulimit>,
    /// Log configuration, if declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LogConfig>,
}

/// Translates every declarative field of `service`.
///
/// # Errors
///
/// Returns the first field that cannot be translated.
pub fn translate_service(service: &Service, ctx: &TranslateContext<'_>) -> Result<ServiceRuntime> {
    tracing::debug!(service = %service.name, "translating runtime primitives");
    let MountSet { mounts, mut tmpfs } = volumes::translate_volumes(&service.volumes, ctx)?;
    for entry in &service.tmpfs {
        tmpfs.push(volumes::parse_tmpfs_entry(entry)?);
    }
    let ports = ports::translate_ports(&service.ports)?;
    let port_map = ports::port_map(&ports);

    Ok(ServiceRuntime {
        mounts,
        tmpfs,
        port_map,
        ports,
        healthcheck: service
            .healthcheck
            .as_ref()
            .map(healthcheck::translate_healthcheck)
            .transpose()?,
        restart: restart::parse_restart(service.restart.as_deref())?,
        ulimits: service
            .ulimits
            .as_ref()
            .map(ulimits::translate_ulimits)
            .transpose()?
            .unwrap_or_default(),
        logging: service
            .logging
            .as_ref()
            .map(logging::translate_logging)
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::translate::restart::RestartPolicyName;

    #[test]
    fn translates_a_full_service() {
        let service = Service {
            name: "web".into(),
            image: Some("nginx".into()),
            volumes: vec![serde_yaml::from_str("\"./html:/usr/share/nginx/html:ro\"").expect("yaml")],
            tmpfs: vec!["/run:size=1m".into()],
            ports: vec![serde_yaml::from_str("\"8080:80\"").expect("yaml")],
            healthcheck: Some(serde_yaml::from_str("test: curl -f http://localhost").expect("yaml")),
            restart: Some("unless-stopped".into()),
            ..Service::default()
        };
        let working_dir = PathBuf::from("/srv/site");
        let deployment_id = DeploymentId::new("site");
        let declared = BTreeMap::new();
        let ctx = TranslateContext {
            working_dir: &working_dir,
            deployment_id: &deployment_id,
            declared_volumes: &declared,
        };

        let runtime = translate_service(&service, &ctx).expect("translate");
        assert_eq!(runtime.mounts.len(), 1);
        assert_eq!(runtime.mounts[0].source.as_deref(), Some("/srv/site/html"));
        assert_eq!(runtime.tmpfs.len(), 1);
        assert_eq!(runtime.ports.len(), 1);
        assert!(runtime.port_map.contains_key("80/tcp"));
        assert_eq!(runtime.restart.name, RestartPolicyName::UnlessStopped);
        assert!(runtime.healthcheck.is_some());
        assert!(runtime.ulimits.is_empty());
        assert!(runtime.logging.is_none());
    }
}
