use chrono::{Duration, NaiveDate, Weekday};

use crate::error::{Error, Result};

/// Canonical `YYYY-MM-DD` key used for dates in the store and in SQL parameters.
pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Parse a reference date. Accepts `today` or `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("today") {
        return Ok(chrono::Local::now().date_naive());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| Error::invalid(format!("invalid date (expected YYYY-MM-DD): {s}")))
}

/// Parse a weekday name such as `sat`, `Saturday` or `SUN`.
pub fn parse_weekday(s: &str) -> Result<Weekday> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| Error::invalid(format!("invalid weekday: {s}")))
}

/// Parse a comma-separated weekday list. An empty string yields no weekend days.
pub fn parse_weekdays(s: &str) -> Result<Vec<Weekday>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_weekday)
        .collect()
}

/// Easter Sunday in the Gregorian calendar (anonymous Gregorian algorithm).
pub fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32).unwrap()
}

/// Shift a date by a signed number of days.
pub fn offset_date(d: NaiveDate, days: i64) -> NaiveDate {
    d + Duration::days(days)
}
