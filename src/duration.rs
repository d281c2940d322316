//! Human duration grammar used throughout the config:
//! optional `<N>y`, `<N>d`, `<N>h`, `<N>m`, `<N>s` groups, in that order.
//! One year is 365 days; one day is 24 hours.

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;
const SECS_PER_YEAR: u64 = 365 * SECS_PER_DAY;

/// A duration string that did not match the `y/d/h/m/s` grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DurationParseError {
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for DurationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid duration {:?}: expected groups like `7d2h30m`",
            self.value
        )
    }
}

impl std::error::Error for DurationParseError {}

fn grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(\d+)y)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$")
            .expect("duration grammar compiles")
    })
}

/// Parse a duration like `7d2h` or `3h2m1s`. The empty string parses to
/// zero; callers that need a positive duration must check separately.
///
/// # Errors
/// [`DurationParseError`] when the input does not match the grammar.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let captures = grammar()
        .captures(input.trim())
        .ok_or_else(|| DurationParseError {
            value: input.to_owned(),
        })?;
    let group = |i: usize| -> u64 {
        captures
            .get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    let secs = group(1) * SECS_PER_YEAR
        + group(2) * SECS_PER_DAY
        + group(3) * SECS_PER_HOUR
        + group(4) * SECS_PER_MINUTE
        + group(5);
    Ok(Duration::from_secs(secs))
}

/// Render a duration for log lines: `2h5m`, `45s`, `3d` — seconds
/// resolution, zero units omitted.
#[must_use]
pub fn pretty_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        return "0s".to_owned();
    }
    let days = total / SECS_PER_DAY;
    let hours = (total % SECS_PER_DAY) / SECS_PER_HOUR;
    let minutes = (total % SECS_PER_HOUR) / SECS_PER_MINUTE;
    let seconds = total % SECS_PER_MINUTE;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}d"));
    }
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_units() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("22m").unwrap(), Duration::from_secs(22 * 60));
        assert_eq!(
            parse_duration("333h").unwrap(),
            Duration::from_secs(333 * 3600)
        );
        assert_eq!(
            parse_duration("4444d").unwrap(),
            Duration::from_secs(4444 * 24 * 3600)
        );
        assert_eq!(
            parse_duration("5y").unwrap(),
            Duration::from_secs(5 * 365 * 24 * 3600)
        );
    }

    #[test]
    fn combined_groups() {
        assert_eq!(
            parse_duration("3h2m1s").unwrap(),
            Duration::from_secs(3 * 3600 + 2 * 60 + 1)
        );
        assert_eq!(
            parse_duration("7d2h").unwrap(),
            Duration::from_secs(7 * 24 * 3600 + 2 * 3600)
        );
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(parse_duration("").unwrap(), Duration::ZERO);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_duration("five minutes").is_err());
        assert!(parse_duration("1h30").is_err());
        assert!(parse_duration("2m1h").is_err());
    }

    #[test]
    fn pretty_omits_zero_units() {
        assert_eq!(pretty_duration(Duration::from_secs(0)), "0s");
        assert_eq!(pretty_duration(Duration::from_secs(45)), "45s");
        assert_eq!(pretty_duration(Duration::from_secs(2 * 3600 + 300)), "2h5m");
        assert_eq!(pretty_duration(Duration::from_secs(3 * 24 * 3600)), "3d");
    }
}
