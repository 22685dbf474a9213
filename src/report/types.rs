use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::converter::ConverterKey;
use super::header::ColumnHeader;
use crate::error::{Error, Result};

/// Key segment standing in for a missing grouping value.
pub const NO_VALUE: &str = "N/A";

/// Leading key segment of the sum row.
pub const TOTAL_LABEL: &str = "Total";

/// Presentation kind of a report. Every kind shares the same aggregation
/// engine and differs only in what the key path segments mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Workbasket,
    Category,
    Classification,
    DetailedClassification,
    CustomField,
    Timestamp,
}

impl ReportKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "workbasket" => Ok(ReportKind::Workbasket),
            "category" => Ok(ReportKind::Category),
            "classification" => Ok(ReportKind::Classification),
            "detailed-classification" => Ok(ReportKind::DetailedClassification),
            "custom-field" => Ok(ReportKind::CustomField),
            "timestamp" => Ok(ReportKind::Timestamp),
            other => Err(Error::invalid(format!("unknown report kind: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Workbasket => "workbasket",
            ReportKind::Category => "category",
            ReportKind::Classification => "classification",
            ReportKind::DetailedClassification => "detailed-classification",
            ReportKind::CustomField => "custom-field",
            ReportKind::Timestamp => "timestamp",
        }
    }

    /// Names of the key path segments, outermost first.
    pub fn dimensions(&self) -> &'static [&'static str] {
        match self {
            ReportKind::Workbasket => &["workbasket"],
            ReportKind::Category => &["category"],
            ReportKind::Classification => &["classification"],
            ReportKind::DetailedClassification => &["classification", "attachment_classification"],
            ReportKind::CustomField => &["custom_attribute"],
            ReportKind::Timestamp => &[
                "timestamp",
                "org_level_1",
                "org_level_2",
                "org_level_3",
                "org_level_4",
            ],
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pre-aggregated (group, age) count delivered by the query layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeSample {
    pub key_path: Vec<String>,
    /// `None` when the task has no timestamp to age against.
    pub age_in_days: Option<i32>,
    pub count: u64,
}

impl AgeSample {
    pub fn new<S: Into<String>>(
        key_path: impl IntoIterator<Item = S>,
        age_in_days: Option<i32>,
        count: u64,
    ) -> Self {
        Self {
            key_path: key_path.into_iter().map(Into::into).collect(),
            age_in_days,
            count,
        }
    }
}

/// Half-open calendar-age range `[lower, upper)`; `None` bounds are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgeRange {
    pub lower: Option<i32>,
    pub upper: Option<i32>,
}

impl AgeRange {
    pub fn new(lower: Option<i32>, upper: Option<i32>) -> Self {
        Self { lower, upper }
    }

    pub fn single(age: i32) -> Self {
        Self::new(Some(age), age.checked_add(1))
    }

    pub fn of_header(header: &ColumnHeader) -> Self {
        Self::new(header.lower(), header.upper())
    }

    pub fn contains(&self, age: i32) -> bool {
        self.lower.map_or(true, |lo| age >= lo) && self.upper.map_or(true, |hi| age < hi)
    }

    fn lo(&self) -> i64 {
        self.lower.map_or(i64::MIN, i64::from)
    }

    fn hi(&self) -> i64 {
        self.upper.map_or(i64::MAX, i64::from)
    }

    fn from_wide(lo: i64, hi: i64) -> Self {
        Self::new(
            (lo != i64::MIN).then_some(lo as i32),
            (hi != i64::MAX).then_some(hi as i32),
        )
    }

    /// Overlap of two ranges, `None` if they are disjoint.
    pub fn intersect(&self, other: &AgeRange) -> Option<AgeRange> {
        let lo = self.lo().max(other.lo());
        let hi = self.hi().min(other.hi());
        (lo < hi).then(|| Self::from_wide(lo, hi))
    }

    /// Every age in the range, or `None` if the range is unbounded.
    pub fn literal_ages(&self) -> Option<Vec<i32>> {
        match (self.lower, self.upper) {
            (Some(lo), Some(hi)) => Some((lo..hi).collect()),
            _ => None,
        }
    }
}

/// Sort and merge overlapping or adjacent ranges.
pub fn merge_ranges(ranges: impl IntoIterator<Item = AgeRange>) -> Vec<AgeRange> {
    let mut sorted: Vec<AgeRange> = ranges.into_iter().collect();
    sorted.sort_by_key(|r| (r.lo(), r.hi()));

    let mut merged: Vec<AgeRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.lo() <= last.hi() => {
                *last = AgeRange::from_wide(last.lo(), last.hi().max(range.hi()));
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Index of a row inside a [`Report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RowId(pub(crate) usize);

/// One pivot row. `cells[i]` counts the samples bucketed into column `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub key_path: Vec<String>,
    pub cells: Vec<u64>,
    pub total: u64,
    pub depth: usize,
    /// Whether the row is shown expanded by default.
    pub display: bool,
    pub children: Vec<RowId>,
}

impl ReportRow {
    pub(crate) fn new(key_path: Vec<String>, columns: usize) -> Self {
        let depth = key_path.len().saturating_sub(1);
        let display = depth == 0 || key_path.last().is_some_and(|s| s == NO_VALUE);
        Self {
            key_path,
            cells: vec![0; columns],
            total: 0,
            depth,
            display,
            children: Vec::new(),
        }
    }

    /// The last key segment.
    pub fn label(&self) -> &str {
        self.key_path.last().map_or("", String::as_str)
    }

    pub(crate) fn add(&mut self, column: usize, count: u64) {
        self.cells[column] += count;
        self.total += count;
    }
}

/// An immutable pivot table snapshot.
///
/// Rows live in an arena; `top_level` and every row's `children` list arena
/// ids in first-seen order.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub kind: ReportKind,
    pub dimensions: Vec<String>,
    pub column_headers: Vec<ColumnHeader>,
    pub working_days: bool,
    pub reference_date: NaiveDate,
    /// Sum of counts excluded because they carried no age.
    pub without_age: u64,
    /// Sum of counts whose age lies outside every column.
    pub unbucketed: u64,
    pub(crate) rows: Vec<ReportRow>,
    pub(crate) top_level: Vec<RowId>,
    pub(crate) sum_row: RowId,
    #[serde(skip)]
    pub(crate) index: HashMap<Vec<String>, RowId>,
    /// Tables the ages were converted through, for working-day reports.
    #[serde(skip)]
    pub(crate) converter: Option<ConverterKey>,
}

impl Report {
    /// Top-level rows in first-seen order.
    pub fn rows(&self) -> impl Iterator<Item = &ReportRow> {
        self.top_level.iter().map(|id| self.get(*id))
    }

    pub fn get(&self, id: RowId) -> &ReportRow {
        &self.rows[id.0]
    }

    /// Look up a row at any depth by its full key path.
    pub fn row<S: AsRef<str>>(&self, key_path: &[S]) -> Option<&ReportRow> {
        let key: Vec<String> = key_path.iter().map(|s| s.as_ref().to_string()).collect();
        self.index.get(&key).map(|id| self.get(*id))
    }

    pub fn children<'a>(&'a self, row: &'a ReportRow) -> impl Iterator<Item = &'a ReportRow> + 'a {
        row.children.iter().map(move |id| self.get(*id))
    }

    /// Column totals across all groups, with per-sub-key breakdown as children.
    pub fn sum_row(&self) -> &ReportRow {
        self.get(self.sum_row)
    }

    pub fn converter_key(&self) -> Option<ConverterKey> {
        self.converter
    }

    pub fn row_count(&self) -> usize {
        self.top_level.len()
    }

    /// Depth-first walk over the grouping rows (sum row excluded).
    pub fn walk(&self) -> Vec<&ReportRow> {
        let mut out = Vec::new();
        let mut stack: Vec<RowId> = self.top_level.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let row = self.get(id);
            out.push(row);
            stack.extend(row.children.iter().rev().copied());
        }
        out
    }
}
