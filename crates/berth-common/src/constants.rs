//! System-wide constants and defaults.

/// Name of the network synthesized when a document declares none.
pub const DEFAULT_NETWORK_NAME: &str = "default";

/// Driver of the synthesized default network.
pub const DEFAULT_NETWORK_DRIVER: &str = "bridge";

/// Network drivers that do not trigger an "uncommon driver" warning.
pub const COMMON_NETWORK_DRIVERS: &[&str] =
    &["bridge", "overlay", "host", "none", "macvlan", "ipvlan"];

/// Deployment ID used when nothing better can be derived.
pub const DEFAULT_DEPLOYMENT_ID: &str = "default";

/// Prefix of extension fields that are never reported as unknown.
pub const EXTENSION_PREFIX: &str = "x-";

/// Compose file names probed, in order, when no file is given explicitly.
pub const DEFAULT_COMPOSE_FILES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Environment file loaded from the project directory when present.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Default logging driver handed to the runtime.
pub const DEFAULT_LOG_DRIVER: &str = "json-file";

/// Suggested wait timeout for `service_started`, in seconds.
pub const DEFAULT_STARTED_TIMEOUT_SECS: u64 = 30;
/// Suggested wait timeout for `service_healthy`, in seconds.
pub const DEFAULT_HEALTHY_TIMEOUT_SECS: u64 = 60;
/// Suggested wait timeout for `service_completed_successfully`, in seconds.
pub const DEFAULT_COMPLETED_TIMEOUT_SECS: u64 = 120;

