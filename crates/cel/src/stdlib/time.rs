//! Timestamp accessors and duration parsing.
//!
//! Every accessor takes an optional IANA timezone name (or a fixed
//! `"+HH:MM"` offset); without one, components are read in UTC. The 0-based
//! versus 1-based quirks are part of the surface: `getMonth` and
//! `getDayOfMonth` are 0-based, `getDate` is 1-based, `getDayOfWeek` counts
//! from Sunday as 0.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};

use crate::{
    error::{EvalError, RegistrationError},
    registry::Registry,
    value::Value,
};

type Accessor = fn(&DateTime<FixedOffset>) -> i64;

const ACCESSORS: &[(&str, Accessor)] = &[
    ("getFullYear", |ts| i64::from(ts.year())),
    ("getMonth", |ts| i64::from(ts.month0())),
    ("getDate", |ts| i64::from(ts.day())),
    ("getDayOfMonth", |ts| i64::from(ts.day0())),
    ("getDayOfWeek", |ts| i64::from(ts.weekday().num_days_from_sunday())),
    ("getDayOfYear", |ts| i64::from(ts.ordinal0())),
    ("getHours", |ts| i64::from(ts.hour())),
    ("getMinutes", |ts| i64::from(ts.minute())),
    ("getSeconds", |ts| i64::from(ts.second())),
    ("getMilliseconds", |ts| i64::from(ts.timestamp_subsec_millis())),
];

pub(super) fn install(registry: &mut Registry) -> Result<(), RegistrationError> {
    for (name, accessor) in ACCESSORS {
        let accessor = *accessor;
        registry.register_function(&format!("timestamp.{name}(): int"), move |args| {
            let ts = receiver(args)?;
            Ok(Value::Int(accessor(&in_timezone(ts, None)?)))
        })?;
        registry.register_function(&format!("timestamp.{name}(string): int"), move |args| {
            let ts = receiver(args)?;
            let [_, Value::String(tz)] = args else {
                return Err(EvalError::new("expected a timezone string"));
            };
            Ok(Value::Int(accessor(&in_timezone(ts, Some(tz))?)))
        })?;
    }
    Ok(())
}

fn receiver(args: &[Value]) -> Result<DateTime<Utc>, EvalError> {
    match args {
        [Value::Timestamp(ts), ..] => Ok(*ts),
        _ => Err(EvalError::new("expected a timestamp receiver")),
    }
}

/// Resolves the optional timezone argument: IANA names through the tz
/// database, `"+HH:MM"`/`"-HH:MM"` as fixed offsets, nothing as UTC.
fn in_timezone(ts: DateTime<Utc>, tz: Option<&str>) -> Result<DateTime<FixedOffset>, EvalError> {
    let Some(name) = tz else {
        return Ok(ts.fixed_offset());
    };
    if let Ok(tz) = name.parse::<chrono_tz::Tz>() {
        return Ok(ts.with_timezone(&tz).fixed_offset());
    }
    if let Some(offset) = parse_fixed_offset(name) {
        return Ok(ts.with_timezone(&offset));
    }
    Err(EvalError::new(format!("unrecognized timezone '{name}'")))
}

fn parse_fixed_offset(name: &str) -> Option<FixedOffset> {
    let (sign, rest) = match name.as_bytes().first()? {
        b'+' => (1, &name[1..]),
        b'-' => (-1, &name[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Parses a Go-style duration string into signed milliseconds.
///
/// Units `h`, `m`, `s`, `ms`; decimal components (`1.5h`); repeated units
/// sum (`1h30m`, `1h1h`); a single leading `-` negates the whole span.
pub(crate) fn parse_duration(s: &str) -> Result<i64, EvalError> {
    let err = || EvalError::new(format!("unrecognized duration '{s}'"));
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if body.is_empty() {
        return Err(err());
    }

    let mut total_ms = 0.0f64;
    let mut rest = body;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(err)?;
        if num_end == 0 {
            return Err(err());
        }
        let value: f64 = rest[..num_end].parse().map_err(|_| err())?;
        rest = &rest[num_end..];
        // `ms` before `m`: the longest unit must win.
        let (unit_ms, unit_len) = if rest.starts_with("ms") {
            (1.0, 2)
        } else if rest.starts_with('h') {
            (3_600_000.0, 1)
        } else if rest.starts_with('m') {
            (60_000.0, 1)
        } else if rest.starts_with('s') {
            (1_000.0, 1)
        } else {
            return Err(err());
        };
        rest = &rest[unit_len..];
        total_ms += value * unit_ms;
    }

    let total = total_ms.round();
    if !total.is_finite() || total > i64::MAX as f64 {
        return Err(EvalError::new("integer overflow"));
    }
    let ms = total as i64;
    Ok(if negative { -ms } else { ms })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parsing_table() {
        assert_eq!(parse_duration("1h").unwrap(), 3_600_000);
        assert_eq!(parse_duration("30m").unwrap(), 1_800_000);
        assert_eq!(parse_duration("1h30m").unwrap(), 5_400_000);
        assert_eq!(parse_duration("1.5h").unwrap(), 5_400_000);
        assert_eq!(parse_duration("10s").unwrap(), 10_000);
        assert_eq!(parse_duration("250ms").unwrap(), 250);
        assert_eq!(parse_duration("-2s").unwrap(), -2_000);
        // Repeated units sum.
        assert_eq!(parse_duration("1h1h").unwrap(), 7_200_000);
        assert_eq!(parse_duration("1m30s500ms").unwrap(), 90_500);
    }

    #[test]
    fn duration_parsing_rejects_malformed_input() {
        for bad in ["", "-", "h", "5", "1x", "1.5", "ms", "1h-30m"] {
            assert!(parse_duration(bad).is_err(), "'{bad}' should be rejected");
        }
    }

    #[test]
    fn fixed_offsets() {
        assert!(parse_fixed_offset("+02:00").is_some());
        assert!(parse_fixed_offset("-08:30").is_some());
        assert!(parse_fixed_offset("02:00").is_none());
        assert!(parse_fixed_offset("+25:00").is_none());
    }
}
