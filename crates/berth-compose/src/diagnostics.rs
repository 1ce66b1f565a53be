//! Errors and warnings accumulated while parsing and planning.
//!
//! Expected-shape problems never abort through `Result`: every component
//! records [`Issue`]s into a [`Report`] and keeps going, so the caller sees
//! everything that is wrong at once.

use berth_common::types::DependencyCondition;
use serde::Serialize;
use thiserror::Error;

/// A single finding about a document or a planning run.
///
/// Whether an issue is fatal depends on the [`Report`] list it lands in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Issue {
    /// The document has no usable `services` section.
    #[error("document has no services section")]
    MissingServices,

    /// A service has neither `image` nor `build`.
    #[error("service \"{service}\" has neither an image nor a build reference")]
    MissingImage {
        /// Offending service.
        service: String,
    },

    /// A `depends_on` target is not declared in the document.
    #[error("service \"{service}\" depends on undeclared service \"{target}\"")]
    UndeclaredDependency {
        /// Dependent service.
        service: String,
        /// Missing dependency.
        target: String,
    },

    /// `container_name` does not match `^[A-Za-z0-9][A-Za-z0-9_.-]+$`.
    #[error("service \"{service}\" has an invalid container_name \"{name}\"")]
    InvalidContainerName {
        /// Offending service.
        service: String,
        /// Rejected container name.
        name: String,
    },

    /// A fixed `container_name` cannot be shared by several replicas.
    #[error("service \"{service}\" sets container_name but is scaled to {replicas} replicas")]
    ContainerNameWithScale {
        /// Offending service.
        service: String,
        /// Requested replica count.
        replicas: u64,
    },

    /// An external network or volume declares attributes besides `name`.
    #[error("external {kind} \"{name}\" may only declare a name, found: {attributes}")]
    ExternalWithAttributes {
        /// `network` or `volume`.
        kind: &'static str,
        /// Resource name.
        name: String,
        /// Comma-separated offending attributes.
        attributes: String,
    },

    /// A field holds a value of the wrong shape.
    #[error("{scope}: invalid {field}: {message}")]
    InvalidField {
        /// Where the field lives (e.g. `service "web"`).
        scope: String,
        /// Field name.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// A field that is neither known nor an `x-` extension.
    #[error("{scope}: unknown field \"{field}\"")]
    UnknownField {
        /// Where the field lives.
        scope: String,
        /// Field name.
        field: String,
    },

    /// A service references a network the document does not declare.
    #[error("service \"{service}\" references undeclared network \"{network}\"")]
    UndeclaredNetwork {
        /// Referencing service.
        service: String,
        /// Missing network.
        network: String,
    },

    /// A service references a named volume the document does not declare.
    #[error("service \"{service}\" references undeclared volume \"{volume}\"")]
    UndeclaredVolume {
        /// Referencing service.
        service: String,
        /// Missing volume.
        volume: String,
    },

    /// A network uses a driver outside the common set.
    #[error("network \"{network}\" uses uncommon driver \"{driver}\"")]
    UncommonNetworkDriver {
        /// Network name.
        network: String,
        /// Driver name.
        driver: String,
    },

    /// A dependency cycle.
    #[error("circular dependency: {}", path.join(" -> "))]
    Cycle {
        /// Services along the cycle, first element repeated at the end.
        path: Vec<String>,
    },

    /// Services that could not be ordered because of a cycle and were
    /// appended as a final batch.
    #[error("services {} could not be ordered and were placed in a final batch", services.join(", "))]
    UnresolvedRemainder {
        /// Services in the catch-all batch.
        services: Vec<String>,
    },

    /// A dependency condition that the runtime cannot enforce.
    #[error(
        "service \"{service}\" waits for \"{dependency}\" to satisfy {condition}, but \"{dependency}\" declares no healthcheck"
    )]
    UnsatisfiableCondition {
        /// Dependent service.
        service: String,
        /// Dependency lacking a healthcheck.
        dependency: String,
        /// Requested condition.
        condition: DependencyCondition,
    },

    /// A deployable service depends on a service that was skipped.
    #[error("service \"{service}\" depends on \"{dependency}\", which is not deployed in this run")]
    SkippedDependency {
        /// Dependent service.
        service: String,
        /// Skipped dependency.
        dependency: String,
    },

    /// Two active profiles are declared mutually exclusive.
    #[error("profiles \"{first}\" and \"{second}\" conflict and cannot both be active")]
    ProfileConflict {
        /// First profile (alphabetically).
        first: String,
        /// Second profile.
        second: String,
    },

    /// A profile was activated because another active profile requires it.
    #[error("profile \"{profile}\" was activated because profile \"{required_by}\" depends on it")]
    ProfileAutoAdded {
        /// Profile that was added.
        profile: String,
        /// Profile whose dependency pulled it in.
        required_by: String,
    },

    /// A requested profile is not mentioned anywhere in the document.
    #[error("requested profile \"{profile}\" is not used by any service or declaration")]
    UnknownProfile {
        /// Requested profile.
        profile: String,
    },
}

/// Errors and warnings produced by one component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Fatal findings.
    pub errors: Vec<Issue>,
    /// Non-fatal findings.
    pub warnings: Vec<Issue>,
}

impl Report {
    /// Records a fatal issue.
    pub fn error(&mut self, issue: Issue) {
        tracing::warn!(%issue, "error recorded");
        self.errors.push(issue);
    }

    /// Records a non-fatal issue.
    pub fn warn(&mut self, issue: Issue) {
        tracing::debug!(%issue, "warning recorded");
        self.warnings.push(issue);
    }

    /// Moves all findings of `other` into `self`.
    pub fn absorb(&mut self, other: Self) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Returns `true` if any fatal issue was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Renders the report into a [`ValidationResult`].
    #[must_use]
    pub fn to_validation(&self) -> ValidationResult {
        ValidationResult {
            valid: self.errors.is_empty(),
            errors: self.errors.iter().map(ToString::to_string).collect(),
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Externally visible validation outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// `true` when no errors were found.
    pub valid: bool,
    /// Error messages.
    pub errors: Vec<String>,
    /// Warning messages.
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_joins_path() {
        let issue = Issue::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(issue.to_string(), "circular dependency: a -> b -> a");
    }

    #[test]
    fn report_without_errors_is_valid() {
        let mut report = Report::default();
        report.warn(Issue::UnknownProfile {
            profile: "dev".into(),
        });
        let result = report.to_validation();
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn absorb_keeps_severity() {
        let mut left = Report::default();
        left.error(Issue::MissingServices);
        let mut right = Report::default();
        right.warn(Issue::UnknownProfile {
            profile: "x".into(),
        });
        right.error(Issue::MissingImage {
            service: "web".into(),
        });
        left.absorb(right);
        assert_eq!(left.errors.len(), 2);
        assert_eq!(left.warnings.len(), 1);
        assert!(!left.to_validation().valid);
    }
}
