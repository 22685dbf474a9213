//! Folds age samples into a hierarchical pivot [`Report`].

use std::collections::HashMap;

use chrono::NaiveDate;

use super::converter::{ConverterKey, DayOffsetConverter};
use super::header::{validate_headers, ColumnHeader};
use super::types::{AgeSample, Report, ReportKind, ReportRow, RowId, NO_VALUE, TOTAL_LABEL};
use crate::error::{Error, Result};

/// Build a report from `samples`.
///
/// Passing a converter switches the report to working days: every age is
/// rewritten through it before bucketing. It must have been built for
/// `headers` and `reference_date`.
pub fn aggregate(
    kind: ReportKind,
    samples: impl IntoIterator<Item = AgeSample>,
    headers: &[ColumnHeader],
    converter: Option<&DayOffsetConverter>,
    reference_date: NaiveDate,
) -> Result<Report> {
    validate_headers(headers)?;
    if let Some(c) = converter {
        if c.reference_date() != reference_date {
            return Err(Error::invalid(format!(
                "converter built for {} cannot age a report for {}",
                c.reference_date(),
                reference_date
            )));
        }
        if c.key() != ConverterKey::for_headers(headers, reference_date)? {
            return Err(Error::invalid(
                "converter was built for different column limits",
            ));
        }
    }

    let columns = Columns::new(headers);
    let mut builder = ReportBuilder::new(kind.dimensions().len(), headers.len());

    for sample in samples {
        builder.check_width(&sample.key_path)?;
        let Some(age) = sample.age_in_days else {
            builder.without_age += sample.count;
            continue;
        };
        let age = converter.map_or(age, |c| c.convert_days_to_working_days(age));
        match columns.bucket(age)? {
            Some(column) => builder.add(&sample.key_path, column, sample.count),
            None => builder.unbucketed += sample.count,
        }
    }

    if builder.unbucketed > 0 {
        log::warn!(
            "{} task(s) fall outside every report column",
            builder.unbucketed
        );
    }
    log::debug!(
        "Aggregated {} report: {} top-level rows, {} tasks without age",
        kind,
        builder.top_level.len(),
        builder.without_age
    );

    Ok(builder.finish(kind, headers, converter.map(|c| c.key()), reference_date))
}

struct Columns<'a> {
    headers: &'a [ColumnHeader],
    lowest: i32,
    highest: i32,
}

impl<'a> Columns<'a> {
    fn new(headers: &'a [ColumnHeader]) -> Self {
        Self {
            headers,
            lowest: headers.iter().map(|h| h.lower_limit).min().unwrap_or(i32::MIN),
            highest: headers.iter().map(|h| h.upper_limit).max().unwrap_or(i32::MAX),
        }
    }

    /// Index of the first header containing `age`.
    ///
    /// `None` for ages outside the span of all headers; an unclaimed age
    /// inside the span means the headers have a gap.
    fn bucket(&self, age: i32) -> Result<Option<usize>> {
        if let Some(i) = self.headers.iter().position(|h| h.fits(age)) {
            return Ok(Some(i));
        }
        if age >= self.lowest && age < self.highest {
            return Err(Error::invalid(format!(
                "age {age} falls into a gap between report columns"
            )));
        }
        Ok(None)
    }
}

struct ReportBuilder {
    width: usize,
    columns: usize,
    rows: Vec<ReportRow>,
    index: HashMap<Vec<String>, RowId>,
    top_level: Vec<RowId>,
    sum_row: RowId,
    sum_index: HashMap<Vec<String>, RowId>,
    without_age: u64,
    unbucketed: u64,
}

impl ReportBuilder {
    fn new(width: usize, columns: usize) -> Self {
        let mut sum_key = vec![TOTAL_LABEL.to_string()];
        sum_key.resize(width.max(1), NO_VALUE.to_string());
        let mut sum = ReportRow::new(sum_key, columns);
        sum.depth = 0;
        sum.display = true;

        Self {
            width,
            columns,
            rows: vec![sum],
            index: HashMap::new(),
            top_level: Vec::new(),
            sum_row: RowId(0),
            sum_index: HashMap::new(),
            without_age: 0,
            unbucketed: 0,
        }
    }

    fn check_width(&self, key_path: &[String]) -> Result<()> {
        if key_path.len() != self.width {
            return Err(Error::invalid(format!(
                "sample key {:?} has {} segment(s), report expects {}",
                key_path,
                key_path.len(),
                self.width
            )));
        }
        Ok(())
    }

    fn add(&mut self, key_path: &[String], column: usize, count: u64) {
        let mut parent: Option<RowId> = None;
        for depth in 1..=key_path.len() {
            let id = self.row_for(&key_path[..depth], parent);
            self.rows[id.0].add(column, count);
            parent = Some(id);
        }

        // Sum row: same walk with the leading segment replaced by the label.
        self.rows[self.sum_row.0].add(column, count);
        let mut parent = self.sum_row;
        for depth in 2..=key_path.len() {
            let mut key = Vec::with_capacity(depth);
            key.push(TOTAL_LABEL.to_string());
            key.extend_from_slice(&key_path[1..depth]);
            let id = match self.sum_index.get(&key) {
                Some(id) => *id,
                None => {
                    let id = self.push(key.clone(), Some(parent));
                    self.sum_index.insert(key, id);
                    id
                }
            };
            self.rows[id.0].add(column, count);
            parent = id;
        }
    }

    fn row_for(&mut self, key: &[String], parent: Option<RowId>) -> RowId {
        if let Some(id) = self.index.get(key) {
            return *id;
        }
        let id = self.push(key.to_vec(), parent);
        if parent.is_none() {
            self.top_level.push(id);
        }
        self.index.insert(key.to_vec(), id);
        id
    }

    fn push(&mut self, key: Vec<String>, parent: Option<RowId>) -> RowId {
        let id = RowId(self.rows.len());
        self.rows.push(ReportRow::new(key, self.columns));
        if let Some(p) = parent {
            self.rows[p.0].children.push(id);
        }
        id
    }

    fn finish(
        self,
        kind: ReportKind,
        headers: &[ColumnHeader],
        converter: Option<ConverterKey>,
        reference_date: NaiveDate,
    ) -> Report {
        Report {
            kind,
            dimensions: kind.dimensions().iter().map(|d| d.to_string()).collect(),
            column_headers: headers.to_vec(),
            working_days: converter.is_some(),
            reference_date,
            without_age: self.without_age,
            unbucketed: self.unbucketed,
            rows: self.rows,
            top_level: self.top_level,
            sum_row: self.sum_row,
            index: self.index,
            converter,
        }
    }
}
