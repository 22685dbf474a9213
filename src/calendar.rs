//! Working-day calendar consumed by the day offset converter.
//!
//! The converter only ever asks one question: is `reference + offset` a
//! working day? [`HolidayCalendar`] answers it from a weekend definition, an
//! explicit holiday set and, optionally, the German public holidays.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::date_util::{easter_sunday, offset_date};

/// Answers whether the day `reference_date + calendar_day_offset` is a working day.
///
/// Implementations must be pure: the same inputs always give the same answer.
pub trait WorkingDayCalendar: Send + Sync {
    fn is_working_day(&self, calendar_day_offset: i64, reference_date: NaiveDate) -> bool;
}

/// Weekend + holiday calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayCalendar {
    weekend: Vec<Weekday>,
    holidays: BTreeSet<NaiveDate>,
    german_public_holidays: bool,
}

impl Default for HolidayCalendar {
    fn default() -> Self {
        Self {
            weekend: vec![Weekday::Sat, Weekday::Sun],
            holidays: BTreeSet::new(),
            german_public_holidays: false,
        }
    }
}

impl HolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the weekend definition.
    pub fn with_weekend(mut self, weekend: Vec<Weekday>) -> Self {
        self.weekend = weekend;
        self
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    pub fn with_german_public_holidays(mut self, enabled: bool) -> Self {
        self.german_public_holidays = enabled;
        self
    }

    pub fn weekend(&self) -> &[Weekday] {
        &self.weekend
    }

    pub fn holidays(&self) -> impl Iterator<Item = &NaiveDate> {
        self.holidays.iter()
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
            || (self.german_public_holidays && is_german_public_holiday(date))
    }

    /// True if `date` is neither a weekend day nor a holiday.
    pub fn is_working_date(&self, date: NaiveDate) -> bool {
        !self.weekend.contains(&date.weekday()) && !self.is_holiday(date)
    }
}

impl WorkingDayCalendar for HolidayCalendar {
    fn is_working_day(&self, calendar_day_offset: i64, reference_date: NaiveDate) -> bool {
        self.is_working_date(offset_date(reference_date, calendar_day_offset))
    }
}

/// Reads calendar offsets as days before the reference date.
///
/// Report ages count positive for overdue tasks, so a converter that ages
/// due dates must walk its positive table into the past.
#[derive(Debug, Clone)]
pub struct DaysBefore<C>(pub C);

impl<C: WorkingDayCalendar> WorkingDayCalendar for DaysBefore<C> {
    fn is_working_day(&self, calendar_day_offset: i64, reference_date: NaiveDate) -> bool {
        self.0.is_working_day(-calendar_day_offset, reference_date)
    }
}

/// Nationwide German public holidays: fixed-date ones plus the feasts
/// relative to Easter Sunday.
pub fn is_german_public_holiday(date: NaiveDate) -> bool {
    let fixed = matches!(
        (date.month(), date.day()),
        (1, 1) | (5, 1) | (10, 3) | (12, 25) | (12, 26)
    );
    if fixed {
        return true;
    }
    let easter = easter_sunday(date.year());
    // Good Friday, Easter Monday, Ascension Day, Whit Monday
    [-2, 1, 39, 50]
        .iter()
        .any(|&offset| easter + Duration::days(offset) == date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_default_weekend() {
        let cal = HolidayCalendar::new();
        // 2025-01-10 is a Friday
        let friday = d(2025, 1, 10);
        assert!(cal.is_working_day(0, friday));
        assert!(!cal.is_working_day(1, friday));
        assert!(!cal.is_working_day(2, friday));
        assert!(cal.is_working_day(3, friday));
        assert!(cal.is_working_day(-1, friday));
    }

    #[test]
    fn test_days_before_looks_back() {
        let cal = DaysBefore(HolidayCalendar::new());
        // 2025-01-13 is a Monday: one and two days back are Sunday and Saturday.
        let monday = d(2025, 1, 13);
        assert!(cal.is_working_day(0, monday));
        assert!(!cal.is_working_day(1, monday));
        assert!(!cal.is_working_day(2, monday));
        assert!(cal.is_working_day(3, monday));
        assert!(!cal.is_working_day(-5, monday));
    }

    #[test]
    fn test_explicit_holiday() {
        let cal = HolidayCalendar::new().with_holidays([d(2025, 1, 13)]);
        assert!(!cal.is_working_date(d(2025, 1, 13)));
        assert!(cal.is_working_date(d(2025, 1, 14)));
    }

    #[test]
    fn test_custom_weekend() {
        let cal = HolidayCalendar::new().with_weekend(vec![Weekday::Fri, Weekday::Sat]);
        assert!(!cal.is_working_date(d(2025, 1, 10))); // Friday
        assert!(cal.is_working_date(d(2025, 1, 12))); // Sunday
    }

    #[test]
    fn test_german_public_holidays() {
        assert!(is_german_public_holiday(d(2025, 10, 3)));
        assert!(is_german_public_holiday(d(2025, 4, 18))); // Good Friday
        assert!(is_german_public_holiday(d(2025, 4, 21))); // Easter Monday
        assert!(is_german_public_holiday(d(2025, 5, 29))); // Ascension Day
        assert!(is_german_public_holiday(d(2025, 6, 9))); // Whit Monday
        assert!(!is_german_public_holiday(d(2025, 4, 22)));

        let off = HolidayCalendar::new();
        assert!(off.is_working_date(d(2025, 10, 3)));
        let on = HolidayCalendar::new().with_german_public_holidays(true);
        assert!(!on.is_working_date(d(2025, 10, 3)));
    }
}
