//! Healthcheck normalization.

use berth_common::error::{BerthError, Result};
use serde::Serialize;
use serde_yaml::Value;

use super::duration::duration_field;
use crate::parser::value::{as_bool, as_u64, scalar_to_string};

const TEST_KINDS: &[&str] = &["CMD", "CMD-SHELL", "NONE"];

/// A normalized healthcheck. Durations are in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthcheckSpec {
    /// Test command, first element one of `CMD`, `CMD-SHELL` or `NONE`.
    /// Empty means "inherit from the image".
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub test: Vec<String>,
    /// Time between checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Time a single check may take.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Grace period before failures count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_period: Option<u64>,
    /// Time between checks during the start period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_interval: Option<u64>,
    /// Consecutive failures before unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u64>,
}

impl HealthcheckSpec {
    /// Returns `true` if the check is switched off.
    pub fn is_disabled(&self) -> bool {
        self.test.first().is_some_and(|kind| kind == "NONE")
    }
}

/// Normalizes a `healthcheck` block.
///
/// # Errors
///
/// Returns an error if the block is not a mapping, `test` has the wrong
/// shape, or a duration cannot be parsed.
pub fn translate_healthcheck(block: &Value) -> Result<HealthcheckSpec> {
    let Value::Mapping(block) = block else {
        return Err(BerthError::invalid_field("healthcheck", "expected a mapping"));
    };
    if block.get("disable").and_then(as_bool).unwrap_or(false) {
        return Ok(HealthcheckSpec {
            test: vec!["NONE".to_owned()],
            ..HealthcheckSpec::default()
        });
    }

    let duration = |key: &str| {
        block
            .get(key)
            .map(|v| duration_field(&format!("healthcheck.{key}"), v))
            .transpose()
    };
    let retries = block
        .get("retries")
        .map(|v| {
            as_u64(v).ok_or_else(|| {
                BerthError::invalid_field("healthcheck.retries", "expected a non-negative integer")
            })
        })
        .transpose()?;

    Ok(HealthcheckSpec {
        test: block.get("test").map(normalize_test).transpose()?.unwrap_or_default(),
        interval: duration("interval")?,
        timeout: duration("timeout")?,
        start_period: duration("start_period")?,
        start_interval: duration("start_interval")?,
        retries,
    })
}

fn normalize_test(test: &Value) -> Result<Vec<String>> {
    match test {
        Value::String(command) if command == "NONE" => Ok(vec!["NONE".to_owned()]),
        Value::String(command) => Ok(vec!["CMD-SHELL".to_owned(), command.clone()]),
        Value::Sequence(items) => {
            let mut argv = items
                .iter()
                .map(|item| {
                    scalar_to_string(item).ok_or_else(|| {
                        BerthError::invalid_field("healthcheck.test", "list items must be strings")
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            if argv.is_empty() {
                return Err(BerthError::invalid_field("healthcheck.test", "empty command"));
            }
            if !TEST_KINDS.contains(&argv[0].as_str()) {
                argv.insert(0, "CMD".to_owned());
            }
            Ok(argv)
        }
        _ => Err(BerthError::invalid_field(
            "healthcheck.test",
            "expected a string or a list",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(text: &str) -> HealthcheckSpec {
        translate_healthcheck(&serde_yaml::from_str(text).expect("yaml")).expect("healthcheck")
    }

    #[test]
    fn string_test_becomes_cmd_shell() {
        let spec = check("test: curl -f http://localhost\ninterval: 30s\n");
        assert_eq!(spec.test, vec!["CMD-SHELL", "curl -f http://localhost"]);
        assert_eq!(spec.interval, Some(30_000_000_000));
    }

    #[test]
    fn none_string_stays_none() {
        let spec = check("test: NONE\n");
        assert_eq!(spec.test, vec!["NONE"]);
        assert!(spec.is_disabled());
    }

    #[test]
    fn array_gets_cmd_prepended() {
        assert_eq!(
            check("test: [pg_isready, -U, postgres]\n").test,
            vec!["CMD", "pg_isready", "-U", "postgres"]
        );
        assert_eq!(
            check("test: [CMD-SHELL, \"exit 0\"]\n").test,
            vec!["CMD-SHELL", "exit 0"]
        );
    }

    #[test]
    fn all_timing_fields() {
        let spec = check(
            "test: [CMD, true]\ninterval: 10\ntimeout: 5s\nstart_period: 1m\nstart_interval: 500ms\nretries: 3\n",
        );
        assert_eq!(spec.interval, Some(10_000_000_000));
        assert_eq!(spec.timeout, Some(5_000_000_000));
        assert_eq!(spec.start_period, Some(60_000_000_000));
        assert_eq!(spec.start_interval, Some(500_000_000));
        assert_eq!(spec.retries, Some(3));
    }

    #[test]
    fn disable_overrides_test() {
        let spec = check("test: [CMD, true]\ndisable: true\n");
        assert_eq!(spec.test, vec!["NONE"]);
        assert!(spec.interval.is_none());
    }

    #[test]
    fn rejects_bad_shapes() {
        for bad in ["[a]", "test: []", "test: {a: b}", "interval: soon", "retries: -1"] {
            let value: Value = serde_yaml::from_str(bad).expect("yaml");
            assert!(translate_healthcheck(&value).is_err(), "{bad} should fail");
        }
    }
}
