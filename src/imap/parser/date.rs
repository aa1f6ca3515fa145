//! IMAP date parsing.
//!
//! Two distinct grammars are in play: the `APPEND` date-time
//! (`DD-Mon-YYYY HH:MM:SS ±ZZZZ`, with surrounding quotes and a UTC
//! offset) and the bare date used by SEARCH keys like `SINCE`/`BEFORE`
//! (`DD-Mon-YYYY`). Both use a fixed regex and a three-letter month map;
//! no locale-dependent parsing.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use regex::Regex;

use crate::error::{Error, Result};

static DATE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{1,2})-([A-Za-z]{3})-(\d{4})[ T](\d{2}):(\d{2}):(\d{2})\s*([+-]\d{4})$",
    )
    .expect("static regex is valid")
});

static DATE_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})-([A-Za-z]{3})-(\d{4})$").expect("static regex is valid"));

fn month_number(abbrev: &str) -> Option<u32> {
    Some(match abbrev.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    })
}

/// Parse an `APPEND` date-time argument (quotes already stripped by the
/// tokenizer) into a UTC timestamp.
pub fn parse_date_time(raw: &str) -> Result<DateTime<Utc>> {
    let caps = DATE_TIME_RE
        .captures(raw.trim())
        .ok_or_else(|| Error::Protocol(format!("malformed IMAP date-time: {raw:?}")))?;
    let day: u32 = caps[1].parse().map_err(|_| bad_date(raw))?;
    let month = month_number(&caps[2]).ok_or_else(|| bad_date(raw))?;
    let year: i32 = caps[3].parse().map_err(|_| bad_date(raw))?;
    let hour: u32 = caps[4].parse().map_err(|_| bad_date(raw))?;
    let minute: u32 = caps[5].parse().map_err(|_| bad_date(raw))?;
    let second: u32 = caps[6].parse().map_err(|_| bad_date(raw))?;
    let offset = parse_offset(&caps[7]).ok_or_else(|| bad_date(raw))?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| bad_date(raw))?
        .and_hms_opt(hour, minute, second)
        .ok_or_else(|| bad_date(raw))?;
    let local = offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| bad_date(raw))?;
    Ok(local.with_timezone(&Utc))
}

/// Parse a bare SEARCH date (`DD-Mon-YYYY`) into a calendar date.
pub fn parse_search_date(raw: &str) -> Result<NaiveDate> {
    let caps = DATE_ONLY_RE
        .captures(raw.trim())
        .ok_or_else(|| Error::Protocol(format!("malformed IMAP date: {raw:?}")))?;
    let day: u32 = caps[1].parse().map_err(|_| bad_date(raw))?;
    let month = month_number(&caps[2]).ok_or_else(|| bad_date(raw))?;
    let year: i32 = caps[3].parse().map_err(|_| bad_date(raw))?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| bad_date(raw))
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let sign = if raw.starts_with('-') { -1 } else { 1 };
    let digits = &raw[1..];
    let hours: i32 = digits[0..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    let total_seconds = sign * (hours * 3600 + minutes * 60);
    FixedOffset::east_opt(total_seconds)
}

fn bad_date(raw: &str) -> Error {
    Error::Protocol(format!("malformed IMAP date: {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_date_time_with_positive_offset() {
        let dt = parse_date_time("05-Jan-2026 14:30:00 +0100").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-01-05T13:30:00+00:00");
    }

    #[test]
    fn parses_date_time_with_negative_offset() {
        let dt = parse_date_time("05-Jan-2026 14:30:00 -0500").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-01-05T19:30:00+00:00");
    }

    #[test]
    fn parses_bare_search_date() {
        let d = parse_search_date("1-Feb-2026").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_date_time("not a date").is_err());
        assert!(parse_search_date("2026-02-01").is_err());
    }
}
