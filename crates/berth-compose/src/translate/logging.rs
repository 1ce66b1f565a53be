//! Log driver configuration.

use std::collections::BTreeMap;

use berth_common::constants::DEFAULT_LOG_DRIVER;
use berth_common::error::{BerthError, Result};
use serde::Serialize;
use serde_yaml::Value;

use crate::parser::value::scalar_to_string;

/// Log driver and its options, all values stringified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogConfig {
    /// Driver name.
    pub driver: String,
    /// Driver options.
    pub options: BTreeMap<String, String>,
}

/// Translates a `logging` block.
///
/// # Errors
///
/// Returns an error if the block or its options are not mappings of
/// scalars.
pub fn translate_logging(block: &Value) -> Result<LogConfig> {
    let Value::Mapping(block) = block else {
        return Err(BerthError::invalid_field("logging", "expected a mapping"));
    };
    let driver = block
        .get("driver")
        .and_then(scalar_to_string)
        .unwrap_or_else(|| DEFAULT_LOG_DRIVER.to_owned());

    let mut options = BTreeMap::new();
    match block.get("options") {
        None | Some(Value::Null) => {}
        Some(Value::Mapping(opts)) => {
            for (key, value) in opts {
                let (Some(key), Some(value)) = (scalar_to_string(key), scalar_to_string(value)) else {
                    return Err(BerthError::invalid_field(
                        "logging.options",
                        "options must be scalar key/value pairs",
                    ));
                };
                let _ = options.insert(key, value);
            }
        }
        Some(_) => {
            return Err(BerthError::invalid_field("logging.options", "expected a mapping"));
        }
    }
    Ok(LogConfig { driver, options })
}
