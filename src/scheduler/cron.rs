//! Interval strings and 5-field cron evaluation for cloud schedules

use crate::error::{WardenError, WardenResult};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::time::Duration;

/// Parse an interval like `30m`, `6h`, `1d` (units: s, m, h, d)
pub fn parse_interval(value: &str) -> WardenResult<Duration> {
    let value = value.trim();
    let (digits, unit) = value.split_at(value.len().saturating_sub(1));
    let n: u64 = digits.parse().map_err(|_| {
        WardenError::InvalidArgument(format!(
            "invalid interval format: {value} (expected number+unit, e.g. 6h, 30m, 1d)"
        ))
    })?;

    let secs = match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        "d" => n * 86_400,
        _ => {
            return Err(WardenError::InvalidArgument(format!(
                "invalid interval unit in {value} (expected s, m, h or d)"
            )))
        }
    };
    Ok(Duration::from_secs(secs))
}

/// Next fire time of a 5-field cron expression (minute hour day month
/// weekday) strictly after `from`, evaluated in UTC.
///
/// Walks minute by minute, bounded at one year.
pub fn next_cron_time(expr: &str, from: DateTime<Utc>) -> WardenResult<DateTime<Utc>> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let [minute, hour, day, month, weekday] = fields.as_slice() else {
        return Err(WardenError::InvalidArgument(format!(
            "invalid cron expression: {expr} (expected 5 fields)"
        )));
    };

    let mut ts = (from.timestamp() / 60 + 1) * 60;
    let max_minutes = 366 * 24 * 60;
    for _ in 0..max_minutes {
        let Some(t) = DateTime::from_timestamp(ts, 0) else {
            break;
        };

        // cron allows both 0 and 7 for Sunday
        let wd = t.weekday().num_days_from_sunday();
        let weekday_matches =
            matches_cron_field(wd, weekday) || (wd == 0 && matches_cron_field(7, weekday));

        if matches_cron_field(t.minute(), minute)
            && matches_cron_field(t.hour(), hour)
            && matches_cron_field(t.day(), day)
            && matches_cron_field(t.month(), month)
            && weekday_matches
        {
            return Ok(t);
        }
        ts += 60;
    }

    Err(WardenError::InvalidArgument(format!(
        "no fire time within a year for cron: {expr}"
    )))
}

/// Match one value against one cron field: `*`, exact, `a-b` ranges,
/// `a,b,c` lists and `*/n` or `a-b/n` steps
fn matches_cron_field(value: u32, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Some((base, step)) = pattern.split_once('/') {
        let Ok(step) = step.parse::<u32>() else {
            return false;
        };
        if step == 0 {
            return false;
        }
        if base == "*" {
            return value % step == 0;
        }
        if let Some((start, end)) = parse_range(base) {
            return value >= start && value <= end && (value - start) % step == 0;
        }
        return false;
    }

    if let Some((start, end)) = parse_range(pattern) {
        return value >= start && value <= end;
    }

    pattern.split(',').any(|p| p.parse::<u32>() == Ok(value))
}

fn parse_range(pattern: &str) -> Option<(u32, u32)> {
    let (start, end) = pattern.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}
