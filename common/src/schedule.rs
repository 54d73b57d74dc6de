use crate::job::IntervalUnit;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};

/// Canonical scheduling period of an interval, in seconds.
pub fn interval_seconds(value: u64, unit: &IntervalUnit) -> u64 {
    value.saturating_mul(unit.multiplier())
}

/// `anchor + interval_seconds`, saturating at the largest representable time.
pub fn next_run_after(anchor: DateTime<Utc>, interval_seconds: u64) -> DateTime<Utc> {
    i64::try_from(interval_seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|d| anchor.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Parses a user interval such as `"5m"`, `"2 hours"` or `"1d"`.
pub fn parse_interval(s: &str) -> Result<(u64, IntervalUnit)> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("Missing unit in interval: {}", s))?;
    let (num, unit) = s.split_at(split);
    let n: u64 = num
        .parse()
        .map_err(|_| anyhow!("Invalid interval value: {}", s))?;
    if n == 0 {
        return Err(anyhow!("Interval must be at least 1: {}", s));
    }
    let unit = match unit.trim().to_lowercase().as_str() {
        "m" | "min" | "mins" | "minute" | "minutes" => IntervalUnit::Minutes,
        "h" | "hour" | "hours" => IntervalUnit::Hours,
        "d" | "day" | "days" => IntervalUnit::Days,
        other => return Err(anyhow!("Unknown unit: {}", other)),
    };
    Ok((n, unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_seconds_per_unit() {
        for value in [1, 5, 90] {
            assert_eq!(interval_seconds(value, &IntervalUnit::Minutes), value * 60);
            assert_eq!(interval_seconds(value, &IntervalUnit::Hours), value * 3600);
            assert_eq!(interval_seconds(value, &IntervalUnit::Days), value * 86400);
            assert_eq!(interval_seconds(value, &IntervalUnit::Other("fortnights".into())), value);
        }
    }

    #[test]
    fn test_next_run_saturates() {
        let now: DateTime<Utc> = "2024-05-01T10:00:00Z".parse().unwrap();
        assert_eq!(next_run_after(now, 60), "2024-05-01T10:01:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(next_run_after(now, u64::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("5m").unwrap(), (5, IntervalUnit::Minutes));
        assert_eq!(parse_interval("2 hours").unwrap(), (2, IntervalUnit::Hours));
        assert_eq!(parse_interval("1d").unwrap(), (1, IntervalUnit::Days));
        assert!(parse_interval("10").is_err());
        assert!(parse_interval("10w").is_err());
        assert!(parse_interval("m").is_err());
        assert!(parse_interval("0m").is_err());
        assert!(parse_interval("00 hours").is_err());
    }
}
