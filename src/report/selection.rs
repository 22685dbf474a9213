//! Maps selected report cells back to the key and age predicates that
//! produced them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::converter::DayOffsetConverter;
use super::types::{AgeRange, Report};
use crate::error::{Error, Result};

/// A (row, column) cell picked from a rendered report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectedItem {
    pub key_path: Vec<String>,
    pub column: usize,
}

impl SelectedItem {
    pub fn new<S: Into<String>>(key_path: impl IntoIterator<Item = S>, column: usize) -> Self {
        Self {
            key_path: key_path.into_iter().map(Into::into).collect(),
            column,
        }
    }
}

/// A selection expressed as a key prefix plus the calendar ages that belong
/// to the selected cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSelection {
    pub key_path: Vec<String>,
    pub column: usize,
    /// Disjoint, ascending. Empty if no calendar age lands in the cell.
    pub ages: Vec<AgeRange>,
}

impl ResolvedSelection {
    /// Every literal calendar age, or `None` if a range is unbounded.
    pub fn literal_ages(&self) -> Option<Vec<i32>> {
        let mut ages = Vec::new();
        for range in &self.ages {
            ages.extend(range.literal_ages()?);
        }
        Some(ages)
    }
}

/// Resolve `selections` against the report they were taken from.
///
/// Working-day reports need the converter the report was aggregated with.
/// Duplicate selections are resolved once.
pub fn resolve(
    report: &Report,
    selections: &[SelectedItem],
    converter: Option<&DayOffsetConverter>,
) -> Result<Vec<ResolvedSelection>> {
    let converter = if report.working_days {
        let converter = converter
            .ok_or_else(|| Error::invalid("working-day report needs a day offset converter"))?;
        if converter.reference_date() != report.reference_date {
            return Err(Error::invalid(format!(
                "converter built for {} cannot resolve a report for {}",
                converter.reference_date(),
                report.reference_date
            )));
        }
        if report.converter != Some(converter.key()) {
            return Err(Error::invalid(
                "converter does not match the one the report was built with",
            ));
        }
        Some(converter)
    } else {
        None
    };

    let mut seen = HashSet::new();
    let mut resolved = Vec::new();
    for selection in selections {
        if !seen.insert(selection) {
            continue;
        }
        let header = report.column_headers.get(selection.column).ok_or_else(|| {
            Error::invalid(format!(
                "column {} out of range, report has {} columns",
                selection.column,
                report.column_headers.len()
            ))
        })?;
        if report.row(&selection.key_path).is_none() {
            return Err(Error::invalid(format!(
                "row {:?} is not part of the report",
                selection.key_path
            )));
        }

        let ages = match converter {
            Some(c) => c.days_for_working_day_interval(header.lower(), header.upper()),
            None => vec![AgeRange::of_header(header)],
        };
        resolved.push(ResolvedSelection {
            key_path: selection.key_path.clone(),
            column: selection.column,
            ages,
        });
    }

    log::debug!(
        "Resolved {} selection(s) against {} report",
        resolved.len(),
        report.kind
    );
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::calendar::HolidayCalendar;
    use crate::report::aggregator::aggregate;
    use crate::report::header::{parse_columns, ColumnHeader};
    use crate::report::types::{AgeSample, ReportKind};

    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
    }

    fn headers() -> Vec<ColumnHeader> {
        parse_columns("..0,0,1..5,5..").unwrap()
    }

    fn samples() -> Vec<AgeSample> {
        vec![
            AgeSample::new(["L1", "A1"], Some(0), 2),
            AgeSample::new(["L1", "A2"], Some(3), 1),
            AgeSample::new(["L2", "A1"], Some(8), 4),
        ]
    }

    fn calendar_report() -> Report {
        aggregate(
            ReportKind::DetailedClassification,
            samples(),
            &headers(),
            None,
            friday(),
        )
        .unwrap()
    }

    fn converter() -> DayOffsetConverter {
        DayOffsetConverter::initialize(&headers(), friday(), &HolidayCalendar::new()).unwrap()
    }

    #[test]
    fn test_calendar_days_use_header_interval() {
        let report = calendar_report();
        let resolved = resolve(
            &report,
            &[SelectedItem::new(["L1"], 2), SelectedItem::new(["L2", "A1"], 3)],
            None,
        )
        .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].ages, vec![AgeRange::new(Some(1), Some(5))]);
        assert_eq!(resolved[0].literal_ages(), Some(vec![1, 2, 3, 4]));
        assert_eq!(resolved[1].ages, vec![AgeRange::new(Some(5), None)]);
        assert_eq!(resolved[1].literal_ages(), None);
    }

    #[test]
    fn test_working_days_expand_weekend() {
        let c = converter();
        let report = aggregate(
            ReportKind::DetailedClassification,
            samples(),
            &headers(),
            Some(&c),
            friday(),
        )
        .unwrap();
        let resolved = resolve(&report, &[SelectedItem::new(["L1"], 1)], Some(&c)).unwrap();
        // Working day 0 on a Friday covers Friday, Saturday and Sunday.
        assert_eq!(resolved[0].literal_ages(), Some(vec![0, 1, 2]));

        let resolved = resolve(&report, &[SelectedItem::new(["L1"], 2)], Some(&c)).unwrap();
        assert_eq!(resolved[0].ages, vec![AgeRange::new(Some(3), Some(7))]);
    }

    #[test]
    fn test_resolved_ages_match_cells() {
        let c = converter();
        let many: Vec<AgeSample> = (-20..20)
            .map(|age| AgeSample::new(["WB1"], Some(age), 1))
            .collect();
        let report =
            aggregate(ReportKind::Workbasket, many, &headers(), Some(&c), friday()).unwrap();
        let row = report.row(&["WB1"]).unwrap();
        for column in 0..headers().len() {
            let resolved =
                resolve(&report, &[SelectedItem::new(["WB1"], column)], Some(&c)).unwrap();
            let matching = (-20..20)
                .filter(|age| resolved[0].ages.iter().any(|r| r.contains(*age)))
                .count() as u64;
            assert_eq!(matching, row.cells[column], "column {column}");
        }
    }

    #[test]
    fn test_duplicates_collapse() {
        let report = calendar_report();
        let resolved = resolve(
            &report,
            &[
                SelectedItem::new(["L1"], 1),
                SelectedItem::new(["L1"], 1),
                SelectedItem::new(["L1"], 2),
            ],
            None,
        )
        .unwrap();
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_invalid_selections() {
        let report = calendar_report();
        let out_of_range = resolve(&report, &[SelectedItem::new(["L1"], 4)], None);
        assert!(matches!(out_of_range, Err(Error::InvalidArgument(_))));

        let unknown = resolve(&report, &[SelectedItem::new(["L9"], 0)], None);
        assert!(matches!(unknown, Err(Error::InvalidArgument(_))));

        let partial = resolve(
            &report,
            &[SelectedItem::new(["L1"], 0), SelectedItem::new(["L9"], 0)],
            None,
        );
        assert!(partial.is_err());
    }

    #[test]
    fn test_working_day_report_needs_matching_converter() {
        let c = converter();
        let report = aggregate(
            ReportKind::DetailedClassification,
            samples(),
            &headers(),
            Some(&c),
            friday(),
        )
        .unwrap();
        let missing = resolve(&report, &[SelectedItem::new(["L1"], 0)], None);
        assert!(matches!(missing, Err(Error::InvalidArgument(_))));

        let other_day = DayOffsetConverter::initialize(
            &headers(),
            NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(),
            &HolidayCalendar::new(),
        )
        .unwrap();
        let stale = resolve(&report, &[SelectedItem::new(["L1"], 0)], Some(&other_day));
        assert!(matches!(stale, Err(Error::InvalidArgument(_))));

        let wider = DayOffsetConverter::initialize(
            &parse_columns("..-5,-5..0,0..10,10..").unwrap(),
            friday(),
            &HolidayCalendar::new(),
        )
        .unwrap();
        let mismatched = resolve(&report, &[SelectedItem::new(["L1"], 0)], Some(&wider));
        assert!(matches!(mismatched, Err(Error::InvalidArgument(_))));
    }
}
