//! Unified error types for the Berth workspace.
//!
//! These cover conditions that abort an operation outright. Problems with
//! the shape of a compose document are reported as diagnostics by the
//! engine instead, so a caller always gets a full picture of what failed.

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BerthError {
    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A declarative field could not be translated into a runtime primitive.
    #[error("invalid {field}: {message}")]
    InvalidField {
        /// Name of the offending field (e.g. `ports`, `healthcheck.interval`).
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// The document is not syntactically valid YAML.
    #[error("YAML syntax error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl BerthError {
    /// Shorthand for a [`BerthError::InvalidField`] error.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BerthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_field_message_names_the_field() {
        let err = BerthError::invalid_field("ports", "container port is empty");
        assert_eq!(err.to_string(), "invalid ports: container port is empty");
    }

    #[test]
    fn yaml_errors_convert() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [1, 2")
            .expect_err("unterminated flow sequence");
        let err: BerthError = yaml_err.into();
        assert!(err.to_string().starts_with("YAML syntax error"));
    }
}
