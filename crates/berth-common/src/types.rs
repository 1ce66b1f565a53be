//! Domain primitive types used across the Berth workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of one deployment (the compose "project name").
///
/// Always normalized: lowercase ASCII letters, digits, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentId(String);

impl DeploymentId {
    /// Creates a deployment ID, normalizing the raw value.
    ///
    /// Characters outside `[a-z0-9_-]` are dropped after lowercasing. An
    /// input that normalizes to nothing falls back to
    /// [`crate::constants::DEFAULT_DEPLOYMENT_ID`].
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized: String = raw
            .as_ref()
            .chars()
            .map(|c| c.to_ascii_lowercase())
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if normalized.is_empty() {
            Self(crate::constants::DEFAULT_DEPLOYMENT_ID.to_owned())
        } else {
            Self(normalized)
        }
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefixes a resource name with this deployment ID (`<id>_<name>`).
    #[must_use]
    pub fn scoped(&self, name: &str) -> String {
        format!("{}_{name}", self.0)
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Condition a dependent service waits for before it may start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCondition {
    /// The dependency's container has been started.
    #[default]
    Started,
    /// The dependency reports a healthy status.
    Healthy,
    /// The dependency ran to completion with exit code zero.
    CompletedSuccessfully,
}

impl DependencyCondition {
    /// Returns the compose-file spelling of the condition.
    #[must_use]
    pub const fn as_compose_str(self) -> &'static str {
        match self {
            Self::Started => "service_started",
            Self::Healthy => "service_healthy",
            Self::CompletedSuccessfully => "service_completed_successfully",
        }
    }
}

impl fmt::Display for DependencyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_compose_str())
    }
}

impl FromStr for DependencyCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service_started" | "started" => Ok(Self::Started),
            "service_healthy" | "healthy" => Ok(Self::Healthy),
            "service_completed_successfully" | "completed_successfully" => {
                Ok(Self::CompletedSuccessfully)
            }
            other => Err(format!("unknown dependency condition: {other}")),
        }
    }
}

/// How strictly unknown document fields are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Unknown fields produce a warning.
    #[default]
    Default,
    /// Unknown fields are a hard error.
    Strict,
    /// Unknown fields are ignored entirely.
    Loose,
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Strict => write!(f, "strict"),
            Self::Loose => write!(f, "loose"),
        }
    }
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "strict" => Ok(Self::Strict),
            "loose" => Ok(Self::Loose),
            other => Err(format!(
                "unknown validation mode \"{other}\" (expected default, strict or loose)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_id_is_normalized() {
        assert_eq!(DeploymentId::new("My App.v2").as_str(), "myappv2");
        assert_eq!(DeploymentId::new("web_stack-1").as_str(), "web_stack-1");
    }

    #[test]
    fn deployment_id_falls_back_when_empty() {
        assert_eq!(
            DeploymentId::new("...").as_str(),
            crate::constants::DEFAULT_DEPLOYMENT_ID
        );
    }

    #[test]
    fn scoped_names_use_underscore() {
        assert_eq!(DeploymentId::new("shop").scoped("pgdata"), "shop_pgdata");
    }

    #[test]
    fn condition_parses_compose_spelling() {
        assert_eq!(
            "service_healthy".parse::<DependencyCondition>(),
            Ok(DependencyCondition::Healthy)
        );
        assert_eq!(
            "service_completed_successfully".parse::<DependencyCondition>(),
            Ok(DependencyCondition::CompletedSuccessfully)
        );
        assert!("service_ready".parse::<DependencyCondition>().is_err());
    }

    #[test]
    fn condition_display_roundtrips() {
        for cond in [
            DependencyCondition::Started,
            DependencyCondition::Healthy,
            DependencyCondition::CompletedSuccessfully,
        ] {
            assert_eq!(cond.to_string().parse::<DependencyCondition>(), Ok(cond));
        }
    }

    #[test]
    fn validation_mode_parses_case_insensitively() {
        assert_eq!("STRICT".parse::<ValidationMode>(), Ok(ValidationMode::Strict));
        assert_eq!("loose".parse::<ValidationMode>(), Ok(ValidationMode::Loose));
        assert!("lenient".parse::<ValidationMode>().is_err());
    }
}
