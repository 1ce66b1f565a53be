//! Variable substitution over parsed document trees, built on `nom`.
//!
//! Recognized forms, tried left to right at every `$`:
//!
//! | Form               | Unset        | Set but empty | Set        |
//! |--------------------|--------------|---------------|------------|
//! | `${VAR:-default}`  | `default`    | `default`     | value      |
//! | `${VAR-default}`   | `default`    | `""`          | value      |
//! | `${VAR}`           | kept as-is   | `""`          | value      |
//! | `$VAR`             | kept as-is   | `""`          | value      |
//!
//! Bare `$VAR` only matches `[A-Z_][A-Z0-9_]*`. Only mapping values are
//! rewritten, never keys.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, satisfy},
    combinator::{map, opt, recognize},
    sequence::{pair, preceded},
};
use serde_yaml::Value;

use crate::env::VariableLookup;

/// Fallback attached to a braced variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback<'a> {
    /// `:-default`, used when unset or empty.
    UnsetOrEmpty(&'a str),
    /// `-default`, used only when unset.
    Unset(&'a str),
}

/// A piece of an input string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    /// Text copied through unchanged.
    Literal(&'a str),
    /// A variable reference; `raw` is the exact source text.
    Variable {
        name: &'a str,
        fallback: Option<Fallback<'a>>,
        raw: &'a str,
    },
}

const fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_name_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

const fn is_bare_start(c: char) -> bool {
    c.is_ascii_uppercase() || c == '_'
}

const fn is_bare_continue(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'
}

fn braced_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_name_start), take_while(is_name_continue))).parse(input)
}

fn fallback(input: &str) -> IResult<&str, Fallback<'_>> {
    alt((
        map(
            preceded(tag(":-"), take_while(|c: char| c != '}')),
            Fallback::UnsetOrEmpty,
        ),
        map(
            preceded(char('-'), take_while(|c: char| c != '}')),
            Fallback::Unset,
        ),
    ))
    .parse(input)
}

/// `${NAME}`, `${NAME:-default}` or `${NAME-default}`.
fn braced(input: &str) -> IResult<&str, Segment<'_>> {
    let (rest, _) = tag("${").parse(input)?;
    let (rest, name) = braced_name(rest)?;
    let (rest, fallback) = opt(fallback).parse(rest)?;
    let (rest, _) = char('}').parse(rest)?;
    let raw = &input[..input.len() - rest.len()];
    Ok((
        rest,
        Segment::Variable {
            name,
            fallback,
            raw,
        },
    ))
}

/// `$NAME` with an upper-case name.
fn bare(input: &str) -> IResult<&str, Segment<'_>> {
    let (rest, name) = preceded(
        char('$'),
        recognize(pair(satisfy(is_bare_start), take_while(is_bare_continue))),
    )
    .parse(input)?;
    let raw = &input[..input.len() - rest.len()];
    Ok((
        rest,
        Segment::Variable {
            name,
            fallback: None,
            raw,
        },
    ))
}

fn literal(input: &str) -> IResult<&str, Segment<'_>> {
    alt((
        map(take_while1(|c: char| c != '$'), Segment::Literal),
        map(tag("$"), Segment::Literal),
    ))
    .parse(input)
}

fn segment(input: &str) -> IResult<&str, Segment<'_>> {
    alt((braced, bare, literal)).parse(input)
}

/// Substitutes every variable reference in `text`.
pub fn substitute_str(text: &str, lookup: &dyn VariableLookup) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while !rest.is_empty() {
        let Ok((next, seg)) = segment(rest) else {
            out.push_str(rest);
            break;
        };
        match seg {
            Segment::Literal(s) => out.push_str(s),
            Segment::Variable {
                name,
                fallback,
                raw,
            } => out.push_str(&resolve(name, fallback, raw, lookup)),
        }
        rest = next;
    }
    out
}

fn resolve(
    name: &str,
    fallback: Option<Fallback<'_>>,
    raw: &str,
    lookup: &dyn VariableLookup,
) -> String {
    let value = lookup.lookup(name);
    match (value, fallback) {
        (Some(v), Some(Fallback::UnsetOrEmpty(default))) if v.is_empty() => default.to_owned(),
        (Some(v), _) => v,
        (None, Some(Fallback::UnsetOrEmpty(default) | Fallback::Unset(default))) => {
            default.to_owned()
        }
        (None, None) => {
            tracing::debug!(variable = name, "variable is unset, leaving reference in place");
            raw.to_owned()
        }
    }
}

/// Rewrites every string scalar in `value` in place.
///
/// Mapping keys are left untouched; sequences, mapping values and tagged
/// values are walked recursively.
pub fn substitute_value(value: &mut Value, lookup: &dyn VariableLookup) {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = substitute_str(s, lookup);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                substitute_value(item, lookup);
            }
        }
        Value::Mapping(mapping) => {
            for (_, item) in mapping.iter_mut() {
                substitute_value(item, lookup);
            }
        }
        Value::Tagged(tagged) => substitute_value(&mut tagged.value, lookup),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn braced_variable_is_replaced() {
        let vars = env(&[("TAG", "1.2")]);
        assert_eq!(substitute_str("nginx:${TAG}", &vars), "nginx:1.2");
    }

    #[test]
    fn unset_braced_variable_is_kept_verbatim() {
        let vars = env(&[]);
        assert_eq!(substitute_str("nginx:${TAG}", &vars), "nginx:${TAG}");
    }

    #[test]
    fn colon_dash_default_applies_when_empty() {
        let vars = env(&[("PORT", "")]);
        assert_eq!(substitute_str("${PORT:-8080}", &vars), "8080");
    }

    #[test]
    fn dash_default_preserves_empty() {
        let vars = env(&[("PORT", "")]);
        assert_eq!(substitute_str("${PORT-8080}", &vars), "");
    }

    #[test]
    fn both_defaults_apply_when_unset() {
        let vars = env(&[]);
        assert_eq!(substitute_str("${A:-x}/${B-y}", &vars), "x/y");
    }

    #[test]
    fn set_value_wins_over_defaults() {
        let vars = env(&[("A", "real")]);
        assert_eq!(substitute_str("${A:-x} ${A-y}", &vars), "real real");
    }

    #[test]
    fn default_may_contain_colons_and_slashes() {
        let vars = env(&[]);
        assert_eq!(
            substitute_str("${DB_URL:-postgres://db:5432/app}", &vars),
            "postgres://db:5432/app"
        );
    }

    #[test]
    fn bare_variable_requires_uppercase() {
        let vars = env(&[("HOME_DIR", "/srv"), ("lower", "nope")]);
        assert_eq!(substitute_str("$HOME_DIR/data", &vars), "/srv/data");
        assert_eq!(substitute_str("$lower", &vars), "$lower");
    }

    #[test]
    fn unset_bare_variable_is_kept() {
        let vars = env(&[]);
        assert_eq!(substitute_str("cost: $PRICE", &vars), "cost: $PRICE");
    }

    #[test]
    fn lone_and_trailing_dollars_pass_through() {
        let vars = env(&[("A", "1")]);
        assert_eq!(substitute_str("$ 5 and $", &vars), "$ 5 and $");
        assert_eq!(substitute_str("${unterminated", &vars), "${unterminated");
        assert_eq!(substitute_str("${A}$", &vars), "1$");
    }

    #[test]
    fn substitution_is_idempotent() {
        let vars = env(&[("TAG", "1.2"), ("EMPTY", "")]);
        let input = "img:${TAG} ${EMPTY:-fallback} ${MISSING} $TAG ${EMPTY-keep}";
        let once = substitute_str(input, &vars);
        let twice = substitute_str(&once, &vars);
        assert_eq!(once, twice);
        assert_eq!(once, "img:1.2 fallback ${MISSING} 1.2 ");
    }

    #[test]
    fn tree_walk_rewrites_values_not_keys() {
        let vars = env(&[("KEY", "replaced")]);
        let mut value: Value =
            serde_yaml::from_str("$KEY: $KEY\nlist: [\"${KEY}\", 3]\nnested: {a: x-$KEY}")
                .expect("yaml");
        substitute_value(&mut value, &vars);
        let mapping = value.as_mapping().expect("mapping");
        assert_eq!(
            mapping.get("$KEY").and_then(Value::as_str),
            Some("replaced")
        );
        assert_eq!(value["list"][0].as_str(), Some("replaced"));
        assert_eq!(value["list"][1].as_u64(), Some(3));
        assert_eq!(value["nested"]["a"].as_str(), Some("x-replaced"));
    }
}
