//! Resource limit (`ulimits`) translation.

use berth_common::error::{BerthError, Result};
use serde::Serialize;
use serde_yaml::Value;

use crate::parser::value::{as_i64, scalar_to_string};

/// One resource limit. `-1` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ulimit {
    /// Limit name (`nofile`, `nproc`, ...).
    pub name: String,
    /// Soft limit.
    pub soft: i64,
    /// Hard limit.
    pub hard: i64,
}

/// Translates a `ulimits` mapping: `name: N` or `name: {soft, hard}`.
///
/// # Errors
///
/// Returns an error for non-numeric limits or a soft limit above the hard
/// limit.
pub fn translate_ulimits(block: &Value) -> Result<Vec<Ulimit>> {
    let Value::Mapping(block) = block else {
        return Err(BerthError::invalid_field("ulimits", "expected a mapping"));
    };
    let mut limits = Vec::with_capacity(block.len());
    for (key, value) in block {
        let name = scalar_to_string(key)
            .ok_or_else(|| BerthError::invalid_field("ulimits", "limit names must be strings"))?;
        let field = format!("ulimits.{name}");
        let number = |v: Option<&Value>, part: &str| {
            v.and_then(as_i64).ok_or_else(|| {
                BerthError::invalid_field(&field, format!("{part} must be an integer"))
            })
        };
        let (soft, hard) = match value {
            Value::Mapping(pair) => (number(pair.get("soft"), "soft")?, number(pair.get("hard"), "hard")?),
            single => {
                let n = number(Some(single), "limit")?;
                (n, n)
            }
        };
        if exceeds(soft, hard) {
            return Err(BerthError::invalid_field(
                field,
                format!("soft limit {soft} exceeds hard limit {hard}"),
            ));
        }
        limits.push(Ulimit { name, soft, hard });
    }
    Ok(limits)
}

/// Compares limits treating `-1` as unlimited.
fn exceeds(soft: i64, hard: i64) -> bool {
    match (soft, hard) {
        (_, -1) => false,
        (-1, _) => true,
        (soft, hard) => soft > hard,
    }
}
