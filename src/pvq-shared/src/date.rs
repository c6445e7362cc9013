//! Date parsing and virtual date-part keys
//!
//! Report data carries dates in whatever shape the upstream source produced:
//! epoch numbers (seconds or milliseconds), `DD.MM.YYYY`, `YYYY-MM-DD`, or
//! ISO-8601 timestamps. Parsing is permissive and total — anything that does
//! not look like a date is simply `None`.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::num::parse_number_str;
use crate::value::Value;

/// Suffix marking a virtual date-part key, e.g. `created__date_part__month`.
pub const DATE_PART_SUFFIX: &str = "__date_part__";

/// Epoch values at or above this are treated as milliseconds, below as seconds.
const MS_EPOCH_THRESHOLD: f64 = 1.0e10;

/// A component of a date exposed as a virtual record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    /// Four-digit year
    Year,
    /// Zero-padded month
    Month,
    /// Zero-padded day of month
    Day,
}

impl DatePart {
    /// Parse from the key-suffix spelling.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "year" => Some(DatePart::Year),
            "month" => Some(DatePart::Month),
            "day" => Some(DatePart::Day),
            _ => None,
        }
    }

    /// The key-suffix spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Month => "month",
            DatePart::Day => "day",
        }
    }
}

/// Split a virtual date-part key into its base field and part.
///
/// Returns `None` when the key has no date-part suffix or names an unknown
/// part.
#[must_use]
pub fn parse_date_part_key(key: &str) -> Option<(&str, DatePart)> {
    let idx = key.find(DATE_PART_SUFFIX)?;
    let base = &key[..idx];
    let part = DatePart::from_str(&key[idx + DATE_PART_SUFFIX.len()..])?;
    if base.is_empty() {
        return None;
    }
    Some((base, part))
}

/// Parse any record value into a UTC datetime, permissively.
#[must_use]
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Int(i) => from_epoch(*i as f64),
        Value::Float(f) => from_epoch(*f),
        Value::String(s) => parse_date_str(s),
        _ => None,
    }
}

/// Parse a string into a UTC datetime.
#[must_use]
pub fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%d.%m.%Y") {
        return naive_midnight(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return naive_midnight(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    // Bare numeric strings are epoch timestamps
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return parse_number_str(trimmed).and_then(from_epoch);
    }
    None
}

/// Epoch milliseconds of a date-coercible value.
#[must_use]
pub fn epoch_ms(value: &Value) -> Option<i64> {
    parse_date(value).map(|dt| dt.timestamp_millis())
}

/// Render one component of a parsed date as the virtual field's value.
#[must_use]
pub fn date_part_value(dt: DateTime<Utc>, part: DatePart) -> String {
    match part {
        DatePart::Year => format!("{}", dt.year()),
        DatePart::Month => format!("{:02}", dt.month()),
        DatePart::Day => format!("{:02}", dt.day()),
    }
}

fn naive_midnight(d: NaiveDate) -> Option<DateTime<Utc>> {
    d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt))
}

fn from_epoch(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let ms = if raw >= MS_EPOCH_THRESHOLD {
        raw as i64
    } else {
        (raw * 1000.0) as i64
    };
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_dotted_date() {
        let dt = parse_date(&Value::string("14.08.2026")).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 8, 14));
    }

    #[test]
    fn test_parse_iso_date() {
        let dt = parse_date(&Value::string("2026-08-14")).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 8, 14));
    }

    #[test]
    fn test_parse_iso_datetime_with_zulu() {
        let dt = parse_date(&Value::string("2026-08-14T12:30:00Z")).unwrap();
        assert_eq!(dt.timestamp(), 1786710600);
    }

    #[test]
    fn test_parse_epoch_seconds_vs_millis() {
        // 2026-08-14T00:00:00Z
        let secs = 1786665600i64;
        let from_secs = parse_date(&Value::Int(secs)).unwrap();
        let from_ms = parse_date(&Value::Int(secs * 1000)).unwrap();
        assert_eq!(from_secs, from_ms);
    }

    #[test]
    fn test_parse_rejects_non_dates() {
        assert_eq!(parse_date(&Value::string("west")), None);
        assert_eq!(parse_date(&Value::string("")), None);
        assert_eq!(parse_date(&Value::Null), None);
        assert_eq!(parse_date(&Value::Bool(true)), None);
    }

    #[test]
    fn test_date_part_key_parsing() {
        assert_eq!(
            parse_date_part_key("created__date_part__month"),
            Some(("created", DatePart::Month))
        );
        assert_eq!(parse_date_part_key("created"), None);
        assert_eq!(parse_date_part_key("created__date_part__week"), None);
        assert_eq!(parse_date_part_key("__date_part__year"), None);
    }

    #[test]
    fn test_date_part_values() {
        let dt = parse_date(&Value::string("2026-03-05")).unwrap();
        assert_eq!(date_part_value(dt, DatePart::Year), "2026");
        assert_eq!(date_part_value(dt, DatePart::Month), "03");
        assert_eq!(date_part_value(dt, DatePart::Day), "05");
    }

    #[test]
    fn test_epoch_ms() {
        assert_eq!(
            epoch_ms(&Value::string("2026-08-14T00:00:00Z")),
            Some(1786665600000)
        );
        assert_eq!(epoch_ms(&Value::string("nope")), None);
    }
}
