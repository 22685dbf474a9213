//! Calendar-day ⇄ working-day offset mapping.
//!
//! A [`DayOffsetConverter`] holds two tables walked out from a reference date:
//! `positive[i]` is the working-day offset reached at calendar offset `i`,
//! `negative[i]` the one reached at offset `-i`. Which dates an offset names
//! is up to the [`WorkingDayCalendar`]. Both tables start at `0 ↦ 0`. Ages inside the walked window are translated through the
//! tables, ages outside it pass through unchanged.
//!
//! The walk is bounded by the column headers: forward up to the largest lower
//! limit, backward up to the smallest upper limit. Ages beyond either end are
//! taken to lie outside every finite column already.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, NaiveDate};

use super::header::{validate_headers, ColumnHeader};
use super::types::{merge_ranges, AgeRange};
use crate::calendar::WorkingDayCalendar;
use crate::error::{Error, Result};

const CACHE_CAPACITY: usize = 64;

/// Identifies the table pair a converter holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConverterKey {
    pub reference_date: NaiveDate,
    /// Working-day offset the positive walk stops at (`>= 0`).
    pub positive_bound: i32,
    /// Working-day offset the negative walk stops at (`<= 0`).
    pub negative_bound: i32,
}

impl ConverterKey {
    /// Derive the table bounds for a header list: the largest finite lower
    /// limit (at least 0) and the smallest finite upper limit (at most 0).
    pub fn for_headers(headers: &[ColumnHeader], reference_date: NaiveDate) -> Result<Self> {
        validate_headers(headers)?;
        Ok(Self {
            reference_date,
            positive_bound: headers.iter().filter_map(|h| h.lower()).fold(0, i32::max),
            negative_bound: headers.iter().filter_map(|h| h.upper()).fold(0, i32::min),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayOffsetConverter {
    key: ConverterKey,
    positive: Vec<i32>,
    negative: Vec<i32>,
}

impl DayOffsetConverter {
    /// Build the tables for `headers` around `reference_date`.
    pub fn initialize(
        headers: &[ColumnHeader],
        reference_date: NaiveDate,
        calendar: &dyn WorkingDayCalendar,
    ) -> Result<Self> {
        let key = ConverterKey::for_headers(headers, reference_date)?;
        Self::build(key, calendar)
    }

    fn build(key: ConverterKey, calendar: &dyn WorkingDayCalendar) -> Result<Self> {
        let positive = walk(calendar, key.reference_date, key.positive_bound, 1)?;
        let negative = walk(calendar, key.reference_date, key.negative_bound, -1)?;
        log::debug!(
            "Built day offset tables for {}: {} days forward, {} days back",
            key.reference_date,
            positive.len() - 1,
            negative.len() - 1
        );
        Ok(Self {
            key,
            positive,
            negative,
        })
    }

    pub fn key(&self) -> ConverterKey {
        self.key
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.key.reference_date
    }

    /// Inclusive calendar-age window covered by the tables.
    pub fn window(&self) -> (i32, i32) {
        (
            1 - self.negative.len() as i32,
            self.positive.len() as i32 - 1,
        )
    }

    /// Calendar age to working-day age. Ages outside the window pass through.
    pub fn convert_days_to_working_days(&self, age_in_days: i32) -> i32 {
        let (min, max) = self.window();
        if (0..=max).contains(&age_in_days) {
            self.positive[age_in_days as usize]
        } else if (min..0).contains(&age_in_days) {
            self.negative[age_in_days.unsigned_abs() as usize]
        } else {
            age_in_days
        }
    }

    /// All calendar ages mapping to `working_days`, ascending.
    ///
    /// Zero draws from both tables and always contains 0 itself. A value no
    /// table entry maps to passes through as `[working_days]`.
    pub fn convert_working_days_to_days(&self, working_days: i32) -> Vec<i32> {
        let mut days = Vec::new();
        if working_days <= 0 {
            days.extend(
                self.negative
                    .iter()
                    .enumerate()
                    .skip(1)
                    .rev()
                    .filter(|(_, wd)| **wd == working_days)
                    .map(|(i, _)| -(i as i32)),
            );
        }
        if working_days >= 0 {
            days.extend(
                self.positive
                    .iter()
                    .enumerate()
                    .filter(|(_, wd)| **wd == working_days)
                    .map(|(i, _)| i as i32),
            );
        }
        if days.is_empty() {
            days.push(working_days);
        }
        days
    }

    /// Every calendar age whose working-day age lies in `[lower, upper)`,
    /// as merged ranges.
    ///
    /// Inside the window each table entry is checked; outside it ages pass
    /// through, so the interval itself applies there.
    pub fn days_for_working_day_interval(
        &self,
        lower: Option<i32>,
        upper: Option<i32>,
    ) -> Vec<AgeRange> {
        let target = AgeRange::new(lower, upper);
        let (min, max) = self.window();

        let mut ranges: Vec<AgeRange> = (min..=max)
            .filter(|d| target.contains(self.convert_days_to_working_days(*d)))
            .map(AgeRange::single)
            .collect();
        ranges.extend(target.intersect(&AgeRange::new(None, Some(min))));
        ranges.extend(target.intersect(&AgeRange::new(Some(max + 1), None)));
        merge_ranges(ranges)
    }
}

/// Calendar days a walk to `bound` may take: a week per working day, plus a
/// year for runs of holidays.
fn walk_limit(bound: i32) -> i64 {
    i64::from(bound.unsigned_abs()) * 7 + 366
}

fn walk(
    calendar: &dyn WorkingDayCalendar,
    reference_date: NaiveDate,
    bound: i32,
    step: i32,
) -> Result<Vec<i32>> {
    let limit = walk_limit(bound);
    // Calendars may read offsets in either direction.
    let reachable = Duration::try_days(limit).is_some_and(|span| {
        reference_date.checked_add_signed(span).is_some()
            && reference_date.checked_sub_signed(span).is_some()
    });
    if !reachable {
        return Err(Error::invalid(format!(
            "working-day offset {bound} is out of the date range around {reference_date}"
        )));
    }

    let mut table = vec![0];
    let mut day: i64 = 0;
    let mut working_day = 0;
    while working_day != bound {
        day += i64::from(step);
        if day.abs() > limit {
            return Err(Error::invalid(format!(
                "no {bound} working-day offset within {limit} days of {reference_date}"
            )));
        }
        if calendar.is_working_day(day, reference_date) {
            working_day += step;
        }
        table.push(working_day);
    }
    Ok(table)
}

/// Shared converters, one per [`ConverterKey`].
///
/// Lookups and builds run under one lock so concurrent first use of a key
/// builds it once. Callers get an `Arc` and use it without the lock.
#[derive(Debug, Clone, Default)]
pub struct ConverterCache {
    inner: Arc<Mutex<HashMap<ConverterKey, Arc<DayOffsetConverter>>>>,
}

impl ConverterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        headers: &[ColumnHeader],
        reference_date: NaiveDate,
        calendar: &dyn WorkingDayCalendar,
    ) -> Result<Arc<DayOffsetConverter>> {
        let key = ConverterKey::for_headers(headers, reference_date)?;
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(converter) = cache.get(&key) {
            return Ok(Arc::clone(converter));
        }

        if cache.len() >= CACHE_CAPACITY {
            if let Some(oldest) = cache.keys().map(|k| k.reference_date).min() {
                cache.retain(|k, _| k.reference_date != oldest);
            }
        }

        let converter = Arc::new(DayOffsetConverter::build(key, calendar)?);
        cache.insert(key, Arc::clone(&converter));
        Ok(converter)
    }

    /// Drop every converter, e.g. after the holiday calendar changed.
    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
