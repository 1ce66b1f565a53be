//! Environment sources and variable lookup.
//!
//! Parses `.env`-style text and merges it with process-level and inline
//! values into a single [`Environment`]. Precedence, lowest first:
//! file-defined, process-level, inline compose-declared.

use std::collections::BTreeMap;

/// Anything that can answer "what is the value of this variable?".
pub trait VariableLookup {
    /// Returns the value of `key`, or `None` if it is unset.
    fn lookup(&self, key: &str) -> Option<String>;
}

impl<F> VariableLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn lookup(&self, key: &str) -> Option<String> {
        self(key)
    }
}

impl VariableLookup for BTreeMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// One layer of variables supplied by the calling layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvSource {
    /// Raw `.env` text.
    File(String),
    /// Snapshot of the process environment.
    Process(BTreeMap<String, String>),
    /// Values declared inline by the caller.
    Inline(BTreeMap<String, String>),
}

impl EnvSource {
    const fn rank(&self) -> u8 {
        match self {
            Self::File(_) => 0,
            Self::Process(_) => 1,
            Self::Inline(_) => 2,
        }
    }
}

/// Merged view over all environment sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `sources` by precedence tier. Within a tier, later sources
    /// override earlier ones.
    #[must_use]
    pub fn from_sources(sources: &[EnvSource]) -> Self {
        let mut ordered: Vec<&EnvSource> = sources.iter().collect();
        ordered.sort_by_key(|s| s.rank());

        let mut env = Self::new();
        for source in ordered {
            match source {
                EnvSource::File(text) => env.vars.extend(parse_dotenv(text)),
                EnvSource::Process(vars) | EnvSource::Inline(vars) => {
                    env.vars
                        .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }
        tracing::debug!(count = env.vars.len(), "environment merged");
        env
    }

    /// Sets a single variable, overriding any existing value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self.vars.insert(key.into(), value.into());
    }

    /// Returns the value of `key` without cloning.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Number of defined variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` if no variable is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl VariableLookup for Environment {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).map(ToOwned::to_owned)
    }
}

/// Parses `.env`-style text into key/value pairs.
///
/// Blank lines and `#` comments are skipped, lines are split on the first
/// `=`, and one matching pair of surrounding quotes is removed from the
/// value. Inside double quotes `\n` and `\t` are unescaped. Lines without
/// `=` are ignored.
#[must_use]
pub fn parse_dotenv(text: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            tracing::trace!(line, "skipping malformed env line");
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let _ = vars.insert(key.to_owned(), unquote(value.trim()));
    }
    vars
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 {
        if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            return inner.replace("\\n", "\n").replace("\\t", "\t");
        }
        if let Some(inner) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
            return inner.to_owned();
        }
    }
    value.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let vars = parse_dotenv("# comment\n\nA=1\n  # indented comment\nB=2\n");
        assert_eq!(vars, map(&[("A", "1"), ("B", "2")]));
    }

    #[test]
    fn parse_splits_on_first_equals() {
        let vars = parse_dotenv("URL=postgres://u:p@db/app?sslmode=disable");
        assert_eq!(
            vars.get("URL").map(String::as_str),
            Some("postgres://u:p@db/app?sslmode=disable")
        );
    }

    #[test]
    fn parse_strips_matching_quotes() {
        let vars = parse_dotenv("A=\"double\"\nB='single'\nC=\"mismatched'\nD=\"\"");
        assert_eq!(vars.get("A").map(String::as_str), Some("double"));
        assert_eq!(vars.get("B").map(String::as_str), Some("single"));
        assert_eq!(vars.get("C").map(String::as_str), Some("\"mismatched'"));
        assert_eq!(vars.get("D").map(String::as_str), Some(""));
    }

    #[test]
    fn parse_unescapes_only_inside_double_quotes() {
        let vars = parse_dotenv("A=\"line1\\nline2\\tend\"\nB='raw\\n'");
        assert_eq!(vars.get("A").map(String::as_str), Some("line1\nline2\tend"));
        assert_eq!(vars.get("B").map(String::as_str), Some("raw\\n"));
    }

    #[test]
    fn parse_ignores_malformed_lines() {
        let vars = parse_dotenv("NOT A PAIR\n=novalue\nOK=yes");
        assert_eq!(vars, map(&[("OK", "yes")]));
    }

    #[test]
    fn parse_accepts_export_prefix() {
        let vars = parse_dotenv("export TOKEN=abc");
        assert_eq!(vars.get("TOKEN").map(String::as_str), Some("abc"));
    }

    #[test]
    fn precedence_is_file_then_process_then_inline() {
        let sources = vec![
            EnvSource::Inline(map(&[("TAG", "inline")])),
            EnvSource::Process(map(&[("TAG", "process"), ("HOME", "/root")])),
            EnvSource::File("TAG=file\nONLY_FILE=1".into()),
        ];
        let env = Environment::from_sources(&sources);
        assert_eq!(env.get("TAG"), Some("inline"));
        assert_eq!(env.get("HOME"), Some("/root"));
        assert_eq!(env.get("ONLY_FILE"), Some("1"));
    }

    #[test]
    fn later_file_overrides_earlier_file() {
        let sources = vec![
            EnvSource::File("A=first".into()),
            EnvSource::File("A=second".into()),
        ];
        let env = Environment::from_sources(&sources);
        assert_eq!(env.lookup("A").as_deref(), Some("second"));
    }

    #[test]
    fn closures_are_lookups() {
        let lookup = |key: &str| (key == "X").then(|| "1".to_owned());
        assert_eq!(lookup.lookup("X").as_deref(), Some("1"));
        assert_eq!(lookup.lookup("Y"), None);
    }
}
