//! Duration strings and calendar-aware timestamp arithmetic.

use std::fmt;
use std::str::FromStr;

use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime};

use crate::error::{Result, SheafError};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;
const NANOS_PER_WEEK: i64 = 7 * NANOS_PER_DAY;

/// A duration made of calendar months plus a fixed number of nanoseconds.
///
/// Parsed from strings such as `"1d"`, `"3h"`, `"2mo"` or `"1y2mo3d4h5m6s"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimeDelta {
    /// Calendar months.
    pub months: i32,
    /// Fixed part in nanoseconds.
    pub nanos: i64,
}

impl TimeDelta {
    /// Fixed-length duration.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self { months: 0, nanos }
    }

    /// Whole days.
    pub const fn days(days: i64) -> Self {
        Self::from_nanos(days * NANOS_PER_DAY)
    }

    /// Whole hours.
    pub const fn hours(hours: i64) -> Self {
        Self::from_nanos(hours * NANOS_PER_HOUR)
    }

    /// True when the duration contains a calendar component.
    pub fn has_months(&self) -> bool {
        self.months != 0
    }

    /// True for the zero duration.
    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.nanos == 0
    }

    /// Negated duration.
    pub fn neg(self) -> Self {
        Self {
            months: -self.months,
            nanos: -self.nanos,
        }
    }

    /// Parses a duration string.
    pub fn parse(s: &str) -> Result<Self> {
        let text = s.trim();
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        if body.is_empty() {
            return Err(SheafError::invalid(format!("empty duration `{s}`")));
        }
        let mut out = TimeDelta::default();
        let bytes = body.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            let digits_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            if digits_start == pos {
                return Err(SheafError::invalid(format!("expected a number in duration `{s}`")));
            }
            let amount: i64 = body[digits_start..pos]
                .parse()
                .map_err(|_| SheafError::invalid(format!("duration amount too large in `{s}`")))?;
            let unit_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
                pos += 1;
            }
            let unit = &body[unit_start..pos];
            let scale = match unit {
                "y" => {
                    out.months += month_count(amount * 12, s)?;
                    continue;
                }
                "mo" => {
                    out.months += month_count(amount, s)?;
                    continue;
                }
                "w" => NANOS_PER_WEEK,
                "d" => NANOS_PER_DAY,
                "h" => NANOS_PER_HOUR,
                "m" => NANOS_PER_MINUTE,
                "s" => NANOS_PER_SECOND,
                "ms" => NANOS_PER_MILLI,
                "us" => NANOS_PER_MICRO,
                "ns" => 1,
                "" => return Err(SheafError::invalid(format!("missing unit in duration `{s}`"))),
                other => {
                    return Err(SheafError::invalid(format!(
                        "unknown duration unit `{other}` in `{s}`"
                    )))
                }
            };
            let nanos = amount
                .checked_mul(scale)
                .ok_or_else(|| SheafError::invalid(format!("duration overflow in `{s}`")))?;
            out.nanos += nanos;
        }
        Ok(if negative { out.neg() } else { out })
    }
}

fn month_count(amount: i64, source: &str) -> Result<i32> {
    i32::try_from(amount).map_err(|_| SheafError::invalid(format!("duration overflow in `{source}`")))
}

impl FromStr for TimeDelta {
    type Err = SheafError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.months != 0 {
            write!(f, "{}mo", self.months)?;
        }
        if self.nanos != 0 || self.months == 0 {
            write!(f, "{}ns", self.nanos)?;
        }
        Ok(())
    }
}

fn to_datetime(ns: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ns))
        .map_err(|e| SheafError::eval(format!("timestamp {ns} out of range: {e}")))
}

fn from_datetime(dt: OffsetDateTime) -> Result<i64> {
    i64::try_from(dt.unix_timestamp_nanos())
        .map_err(|_| SheafError::eval("timestamp overflows i64 nanoseconds"))
}

fn month_index(dt: &OffsetDateTime) -> i64 {
    i64::from(dt.year()) * 12 + i64::from(u8::from(dt.month())) - 1
}

fn date_from_month_index(index: i64, day: u8) -> Result<Date> {
    let year = i32::try_from(index.div_euclid(12))
        .map_err(|_| SheafError::eval("year out of range"))?;
    let month_number = u8::try_from(index.rem_euclid(12) + 1)
        .map_err(|_| SheafError::eval("month out of range"))?;
    let month = Month::try_from(month_number).map_err(|e| SheafError::eval(e.to_string()))?;
    let day = day.min(month.length(year));
    Date::from_calendar_date(year, month, day).map_err(|e| SheafError::eval(e.to_string()))
}

/// `ts + delta`, moving calendar months first and clamping the day of month.
pub fn add_delta(ts: i64, delta: TimeDelta) -> Result<i64> {
    let mut out = ts;
    if delta.months != 0 {
        let dt = to_datetime(ts)?;
        let date = date_from_month_index(month_index(&dt) + i64::from(delta.months), dt.day())?;
        out = from_datetime(dt.replace_date(date))?;
    }
    out.checked_add(delta.nanos)
        .ok_or_else(|| SheafError::eval("timestamp overflow"))
}

/// Floors `ts` to a multiple of `delta` counted from the epoch (months from year zero).
pub fn truncate(ts: i64, delta: TimeDelta) -> Result<i64> {
    match (delta.months, delta.nanos) {
        (0, 0) => Err(SheafError::invalid("cannot truncate by a zero duration")),
        (0, n) => Ok(ts - ts.rem_euclid(n.abs())),
        (m, 0) => {
            let dt = to_datetime(ts)?;
            let index = month_index(&dt);
            let floored = index - index.rem_euclid(i64::from(m.abs()));
            let date = date_from_month_index(floored, 1)?;
            from_datetime(date.midnight().assume_utc())
        }
        _ => Err(SheafError::invalid(format!(
            "cannot truncate by mixed duration {delta}"
        ))),
    }
}

/// Parses `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS` (UTC) into nanoseconds.
pub fn parse_datetime(s: &str) -> Result<i64> {
    let text = s.trim();
    if text.len() > 10 {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let dt = PrimitiveDateTime::parse(text, &format)
            .map_err(|e| SheafError::invalid(format!("invalid datetime `{s}`: {e}")))?;
        from_datetime(dt.assume_utc())
    } else {
        let format = format_description!("[year]-[month]-[day]");
        let date = Date::parse(text, &format)
            .map_err(|e| SheafError::invalid(format!("invalid date `{s}`: {e}")))?;
        from_datetime(date.midnight().assume_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_durations() {
        let d = TimeDelta::parse("1y2mo3d4h5m6s").expect("parse");
        assert_eq!(d.months, 14);
        assert_eq!(
            d.nanos,
            3 * NANOS_PER_DAY + 4 * NANOS_PER_HOUR + 5 * NANOS_PER_MINUTE + 6 * NANOS_PER_SECOND
        );
        assert_eq!(TimeDelta::parse("250ms").expect("parse").nanos, 250 * NANOS_PER_MILLI);
        assert!(TimeDelta::parse("3").is_err());
        assert!(TimeDelta::parse("3x").is_err());
    }

    #[test]
    fn month_arithmetic_clamps_day() {
        let jan31 = parse_datetime("2024-01-31").expect("date");
        let feb29 = parse_datetime("2024-02-29").expect("date");
        let shifted = add_delta(jan31, TimeDelta::parse("1mo").expect("parse")).expect("add");
        assert_eq!(shifted, feb29);
        let mar31 = parse_datetime("2023-03-31").expect("date");
        let feb28 = parse_datetime("2023-02-28").expect("date");
        let back = add_delta(mar31, TimeDelta::parse("-1mo").expect("parse")).expect("add");
        assert_eq!(back, feb28);
    }

    #[test]
    fn truncates_days_and_months() {
        let ts = parse_datetime("2024-03-15 13:45:00").expect("datetime");
        let day = truncate(ts, TimeDelta::days(1)).expect("trunc");
        assert_eq!(day, parse_datetime("2024-03-15").expect("date"));
        let quarter = truncate(ts, TimeDelta::parse("3mo").expect("parse")).expect("trunc");
        assert_eq!(quarter, parse_datetime("2024-01-01").expect("date"));
    }
}
