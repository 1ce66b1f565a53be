//! Duration parsing (`30s`, `1m30s`, `1.5h`, `250ms`) built on `nom`.

use berth_common::error::{BerthError, Result};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{all_consuming, opt, value},
    multi::many1,
    sequence::{pair, preceded},
};
use serde_yaml::Value;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// A number with an optional fraction, kept as digit strings.
type Magnitude<'a> = (&'a str, Option<&'a str>);

fn magnitude(input: &str) -> IResult<&str, Magnitude<'_>> {
    pair(digit1, opt(preceded(char('.'), digit1))).parse(input)
}

/// Unit suffix as a multiplier in nanoseconds. Longer suffixes are tried
/// first so `ms` is not read as `m`.
fn unit(input: &str) -> IResult<&str, u128> {
    alt((
        value(1, tag("ns")),
        value(1_000, tag("us")),
        value(1_000, tag("µs")),
        value(1_000_000, tag("ms")),
        value(NANOS_PER_SECOND, tag("s")),
        value(60 * NANOS_PER_SECOND, tag("m")),
        value(3_600 * NANOS_PER_SECOND, tag("h")),
    ))
    .parse(input)
}

fn segments(input: &str) -> IResult<&str, Vec<(Magnitude<'_>, u128)>> {
    all_consuming(many1(pair(magnitude, unit))).parse(input)
}

fn scale((whole, fraction): Magnitude<'_>, multiplier: u128) -> Option<u128> {
    let mut nanos = whole.parse::<u128>().ok()?.checked_mul(multiplier)?;
    if let Some(fraction) = fraction {
        let digits = u32::try_from(fraction.len()).ok()?;
        let denominator = 10u128.checked_pow(digits)?;
        let numerator = fraction.parse::<u128>().ok()?.checked_mul(multiplier)?;
        nanos = nanos.checked_add(numerator / denominator)?;
    }
    Some(nanos)
}

/// Parses a duration string into nanoseconds.
///
/// A bare number is taken as seconds.
///
/// # Errors
///
/// Returns an error if the text is not a valid duration or overflows.
pub fn parse_duration(text: &str) -> Result<u64> {
    let text = text.trim();
    let invalid = || BerthError::invalid_field("duration", format!("cannot parse \"{text}\""));

    let total = if let Ok((_, bare)) = all_consuming(magnitude).parse(text) {
        scale(bare, NANOS_PER_SECOND)
    } else {
        let (_, parts) = segments(text).map_err(|_| invalid())?;
        parts
            .into_iter()
            .try_fold(0u128, |acc, (m, mult)| acc.checked_add(scale(m, mult)?))
    };
    total
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(invalid)
}

/// Parses a duration field given as a number of seconds or a string.
///
/// # Errors
///
/// Returns an error naming `field` if the value is not a valid duration.
pub fn duration_field(field: &str, value: &Value) -> Result<u64> {
    let nanos = match value {
        Value::Number(n) => {
            if let Some(secs) = n.as_u64() {
                secs.checked_mul(1_000_000_000)
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .and_then(|f| parse_duration(&format!("{f}s")).ok())
            }
        }
        Value::String(s) => parse_duration(s).ok(),
        _ => None,
    };
    nanos.ok_or_else(|| {
        BerthError::invalid_field(field, "expected seconds or a duration such as \"30s\"")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_units() {
        assert_eq!(parse_duration("30s").expect("30s"), 30_000_000_000);
        assert_eq!(parse_duration("250ms").expect("ms"), 250_000_000);
        assert_eq!(parse_duration("10us").expect("us"), 10_000);
        assert_eq!(parse_duration("7ns").expect("ns"), 7);
        assert_eq!(parse_duration("2m").expect("m"), 120_000_000_000);
        assert_eq!(parse_duration("1h").expect("h"), 3_600_000_000_000);
    }

    #[test]
    fn bare_number_is_seconds() {
        assert_eq!(parse_duration("5").expect("bare"), 5_000_000_000);
    }

    #[test]
    fn combined_and_fractional() {
        assert_eq!(parse_duration("1m30s").expect("combined"), 90_000_000_000);
        assert_eq!(parse_duration("1.5s").expect("fraction"), 1_500_000_000);
        assert_eq!(parse_duration("1h0m10s").expect("hms"), 3_610_000_000_000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("10 s").is_err());
    }

    #[test]
    fn field_accepts_numbers_and_strings() {
        let secs: Value = serde_yaml::from_str("30").expect("yaml");
        assert_eq!(duration_field("interval", &secs).expect("number"), 30_000_000_000);
        let text: Value = serde_yaml::from_str("\"45s\"").expect("yaml");
        assert_eq!(duration_field("interval", &text).expect("string"), 45_000_000_000);
        let bad: Value = serde_yaml::from_str("[1]").expect("yaml");
        let err = duration_field("interval", &bad).expect_err("list");
        assert!(err.to_string().contains("interval"));
    }
}
