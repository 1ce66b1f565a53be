//! Configuration model for one planning run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COMPLETED_TIMEOUT_SECS, DEFAULT_DEPLOYMENT_ID, DEFAULT_HEALTHY_TIMEOUT_SECS,
    DEFAULT_STARTED_TIMEOUT_SECS,
};
use crate::types::{DependencyCondition, ValidationMode};

/// Settings that steer parsing and planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Treatment of unknown document fields.
    pub mode: ValidationMode,
    /// Directory relative bind-mount sources are resolved against.
    pub working_dir: PathBuf,
    /// Fallback deployment ID used to scope named volumes when neither
    /// `project_name` nor a top-level `name` in the document is set.
    pub deployment_id: String,
    /// Explicitly requested project name. Takes precedence over the
    /// document's top-level `name`.
    pub project_name: Option<String>,
    /// Requested activation profiles.
    pub profiles: Vec<String>,
    /// Wait timeouts handed to the runtime layer per dependency condition.
    pub timeouts: ConditionTimeouts,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Default,
            working_dir: PathBuf::from("."),
            deployment_id: DEFAULT_DEPLOYMENT_ID.to_owned(),
            project_name: None,
            profiles: Vec::new(),
            timeouts: ConditionTimeouts::default(),
        }
    }
}

/// Per-condition wait timeouts, in seconds.
///
/// The engine never waits on these itself; they are copied into the plan's
/// wait directives for the runtime-invocation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionTimeouts {
    /// Timeout for `service_started`.
    pub started_secs: u64,
    /// Timeout for `service_healthy`.
    pub healthy_secs: u64,
    /// Timeout for `service_completed_successfully`.
    pub completed_secs: u64,
}

impl ConditionTimeouts {
    /// Returns the timeout configured for `condition`.
    #[must_use]
    pub const fn for_condition(&self, condition: DependencyCondition) -> u64 {
        match condition {
            DependencyCondition::Started => self.started_secs,
            DependencyCondition::Healthy => self.healthy_secs,
            DependencyCondition::CompletedSuccessfully => self.completed_secs,
        }
    }
}

impl Default for ConditionTimeouts {
    fn default() -> Self {
        Self {
            started_secs: DEFAULT_STARTED_TIMEOUT_SECS,
            healthy_secs: DEFAULT_HEALTHY_TIMEOUT_SECS,
            completed_secs: DEFAULT_COMPLETED_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_match_conditions() {
        let timeouts = ConditionTimeouts::default();
        assert_eq!(timeouts.for_condition(DependencyCondition::Started), 30);
        assert_eq!(timeouts.for_condition(DependencyCondition::Healthy), 60);
        assert_eq!(
            timeouts.for_condition(DependencyCondition::CompletedSuccessfully),
            120
        );
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PlannerConfig =
            serde_json::from_str(r#"{"mode":"strict","profiles":["dev"]}"#).expect("parse");
        assert_eq!(config.mode, ValidationMode::Strict);
        assert_eq!(config.profiles, vec!["dev"]);
        assert_eq!(config.timeouts, ConditionTimeouts::default());
        assert_eq!(config.deployment_id, DEFAULT_DEPLOYMENT_ID);
        assert_eq!(config.project_name, None);
    }
}
