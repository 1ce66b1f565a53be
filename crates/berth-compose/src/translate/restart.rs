//! Restart policy parsing.

use berth_common::error::{BerthError, Result};
use serde::Serialize;

/// Restart policy name as the runtime expects it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicyName {
    /// Never restart.
    #[default]
    No,
    /// Always restart.
    Always,
    /// Restart unless explicitly stopped.
    UnlessStopped,
    /// Restart on non-zero exit.
    OnFailure,
}

/// A restart policy. `maximum_retry_count` of 0 means unbounded and is only
/// meaningful for [`RestartPolicyName::OnFailure`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartPolicy {
    /// Policy name.
    pub name: RestartPolicyName,
    /// Retry bound for `on-failure`.
    pub maximum_retry_count: u64,
}

/// Parses a `restart` value; absence means `no`.
///
/// # Errors
///
/// Returns an error for unknown policies or a non-numeric retry count.
pub fn parse_restart(value: Option<&str>) -> Result<RestartPolicy> {
    let Some(value) = value.map(str::trim) else {
        return Ok(RestartPolicy::default());
    };
    let (name, retries) = match value.split_once(':') {
        Some((name, retries)) => (name, Some(retries)),
        None => (value, None),
    };
    let name = match name {
        "" | "no" | "false" => RestartPolicyName::No,
        "always" => RestartPolicyName::Always,
        "unless-stopped" => RestartPolicyName::UnlessStopped,
        "on-failure" => RestartPolicyName::OnFailure,
        other => {
            return Err(BerthError::invalid_field(
                "restart",
                format!("unknown policy \"{other}\""),
            ));
        }
    };
    let maximum_retry_count = match retries {
        None => 0,
        Some(count) if name == RestartPolicyName::OnFailure => count.parse().map_err(|_| {
            BerthError::invalid_field("restart", format!("invalid retry count \"{count}\""))
        })?,
        Some(_) => {
            return Err(BerthError::invalid_field(
                "restart",
                "only on-failure accepts a retry count",
            ));
        }
    };
    Ok(RestartPolicy {
        name,
        maximum_retry_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_and_no_mean_never() {
        assert_eq!(parse_restart(None).expect("none"), RestartPolicy::default());
        assert_eq!(
            parse_restart(Some("no")).expect("no").name,
            RestartPolicyName::No
        );
    }

    #[test]
    fn pass_through_policies() {
        assert_eq!(
            parse_restart(Some("always")).expect("always").name,
            RestartPolicyName::Always
        );
        assert_eq!(
            parse_restart(Some("unless-stopped")).expect("unless").name,
            RestartPolicyName::UnlessStopped
        );
    }

    #[test]
    fn on_failure_retry_bounds() {
        assert_eq!(
            parse_restart(Some("on-failure")).expect("unbounded"),
            RestartPolicy {
                name: RestartPolicyName::OnFailure,
                maximum_retry_count: 0
            }
        );
        assert_eq!(
            parse_restart(Some("on-failure:5"))
                .expect("bounded")
                .maximum_retry_count,
            5
        );
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(parse_restart(Some("sometimes")).is_err());
        assert!(parse_restart(Some("on-failure:x")).is_err());
        assert!(parse_restart(Some("always:3")).is_err());
    }

    #[test]
    fn serializes_kebab_case() {
        let json = serde_json::to_string(&parse_restart(Some("unless-stopped")).expect("parse"))
            .expect("json");
        assert_eq!(json, r#"{"name":"unless-stopped","maximumRetryCount":0}"#);
    }
}
