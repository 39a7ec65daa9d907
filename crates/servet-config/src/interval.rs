//! Interval strings such as `"15m"` or `"500ms"`.

use std::time::Duration;

use crate::{ConfigError, Result};

/// Units accepted after the number, with their length in milliseconds.
/// `ms` must be tried before `m` and `s`.
const UNITS: [(&str, u64); 4] = [("ms", 1), ("s", 1_000), ("m", 60_000), ("h", 3_600_000)];

/// Parse `{number}{unit}` where unit is one of `ms`, `s`, `m`, `h`.
///
/// Zero, a missing unit, whitespace or a sign are all rejected.
pub fn parse_interval(input: &str) -> Result<Duration> {
    let invalid = || ConfigError::InvalidInterval(input.to_string());

    let (digits, unit_ms) = UNITS
        .iter()
        .find_map(|(suffix, ms)| input.strip_suffix(suffix).map(|rest| (rest, *ms)))
        .ok_or_else(invalid)?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let quantity: u64 = digits.parse().map_err(|_| invalid())?;
    let millis = quantity.checked_mul(unit_ms).ok_or_else(invalid)?;
    if millis == 0 {
        return Err(invalid());
    }

    Ok(Duration::from_millis(millis))
}

/// Render a duration the way [`parse_interval`] reads it, picking the
/// largest unit that divides it exactly.
pub fn format_interval(duration: Duration) -> String {
    let millis = duration.as_millis() as u64;
    for (suffix, ms) in UNITS.iter().rev() {
        if millis >= *ms && millis % ms == 0 {
            return format!("{}{}", millis / ms, suffix);
        }
    }
    format!("{}ms", millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_interval("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_interval("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_interval("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_interval("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in ["", "ms", "15", "15 m", "-5s", "1.5h", "5d", "m5", "s"] {
            assert!(
                matches!(parse_interval(input), Err(ConfigError::InvalidInterval(_))),
                "accepted {:?}",
                input
            );
        }
    }

    #[test]
    fn test_parse_rejects_zero() {
        assert!(parse_interval("0s").is_err());
        assert!(parse_interval("0ms").is_err());
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!(parse_interval("99999999999999999999h").is_err());
        assert!(parse_interval("18446744073709551615h").is_err());
    }

    #[test]
    fn test_format_picks_largest_unit() {
        assert_eq!(format_interval(Duration::from_secs(900)), "15m");
        assert_eq!(format_interval(Duration::from_secs(7200)), "2h");
        assert_eq!(format_interval(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_interval(Duration::from_secs(90)), "90s");
    }
}
