//! Typed accessors over `serde_yaml::Value`.
//!
//! Compose documents mix scalars, lists and maps freely ("string or list",
//! "list or map"). These helpers flatten the common shapes so extraction
//! code can stay declarative.

use serde_yaml::{Mapping, Value};

/// Renders a scalar as a string. Returns `None` for null, sequences and
/// mappings.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Accepts a single scalar or a list of scalars.
///
/// # Errors
///
/// Returns a description of the offending shape.
pub fn string_or_list(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_to_string(item).ok_or_else(|| "list items must be scalars".to_owned())
            })
            .collect(),
        other => scalar_to_string(other)
            .map(|s| vec![s])
            .ok_or_else(|| "expected a string or a list of strings".to_owned()),
    }
}

/// Returns the string keys of a mapping.
pub fn mapping_keys(mapping: &Mapping) -> impl Iterator<Item = String> + '_ {
    mapping.iter().filter_map(|(k, _)| scalar_to_string(k))
}

/// Reads a boolean, accepting `true`/`false` strings as produced by
/// interpolation.
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" | "True" | "TRUE" => Some(true),
            "false" | "False" | "FALSE" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Reads an unsigned integer, accepting numeric strings.
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a signed integer, accepting numeric strings.
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Returns the string keys present in `mapping` but absent from `known`,
/// skipping `x-` extension keys.
pub fn unknown_keys(mapping: &Mapping, known: &[&str]) -> Vec<String> {
    mapping_keys(mapping)
        .filter(|k| !k.starts_with(berth_common::constants::EXTENSION_PREFIX))
        .filter(|k| !known.contains(&k.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).expect("yaml")
    }

    #[test]
    fn scalars_render_as_strings() {
        assert_eq!(scalar_to_string(&yaml("8080")).as_deref(), Some("8080"));
        assert_eq!(scalar_to_string(&yaml("true")).as_deref(), Some("true"));
        assert_eq!(scalar_to_string(&yaml("abc")).as_deref(), Some("abc"));
        assert_eq!(scalar_to_string(&yaml("[1]")), None);
        assert_eq!(scalar_to_string(&Value::Null), None);
    }

    #[test]
    fn string_or_list_accepts_both_shapes() {
        assert_eq!(string_or_list(&yaml("dev")), Ok(vec!["dev".to_owned()]));
        assert_eq!(
            string_or_list(&yaml("[dev, test]")),
            Ok(vec!["dev".to_owned(), "test".to_owned()])
        );
        assert_eq!(string_or_list(&Value::Null), Ok(Vec::new()));
        assert!(string_or_list(&yaml("{a: 1}")).is_err());
        assert!(string_or_list(&yaml("[[nested]]")).is_err());
    }

    #[test]
    fn booleans_accept_interpolated_strings() {
        assert_eq!(as_bool(&yaml("true")), Some(true));
        assert_eq!(as_bool(&yaml("'false'")), Some(false));
        assert_eq!(as_bool(&yaml("'yes please'")), None);
    }

    #[test]
    fn integers_accept_numeric_strings() {
        assert_eq!(as_u64(&yaml("'3'")), Some(3));
        assert_eq!(as_u64(&yaml("-1")), None);
        assert_eq!(as_i64(&yaml("-1")), Some(-1));
    }

    #[test]
    fn unknown_keys_skip_extensions() {
        let value = yaml("image: x\nx-meta: 1\nbogus: 2");
        let mapping = value.as_mapping().expect("mapping");
        assert_eq!(unknown_keys(mapping, &["image"]), vec!["bogus".to_owned()]);
    }
}
