pub mod filter;
pub mod report_sql;

use chrono::NaiveDate;
use rusqlite::types::ToSql;
use serde::{Deserialize, Serialize};

pub use filter::ReportFilter;

use crate::error::{Error, Result};
use crate::model::TaskTimestamp;
use crate::report::header::{default_columns, validate_headers, ColumnHeader};
use crate::report::ReportKind;

/// Everything needed to build one monitoring report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub kind: ReportKind,
    pub filter: ReportFilter,
    pub columns: Vec<ColumnHeader>,
    pub working_days: bool,
    pub reference_date: NaiveDate,
    /// Attribute whose values key a custom-field report.
    pub custom_field: Option<String>,
    /// Timestamps a timestamp report covers; empty means all of them.
    pub timestamps: Vec<TaskTimestamp>,
}

impl ReportRequest {
    pub fn new(kind: ReportKind, reference_date: NaiveDate) -> Self {
        Self {
            kind,
            filter: ReportFilter::default(),
            columns: default_columns(),
            working_days: false,
            reference_date,
            custom_field: None,
            timestamps: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: ReportFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn columns(mut self, columns: Vec<ColumnHeader>) -> Self {
        self.columns = columns;
        self
    }

    pub fn working_days(mut self, val: bool) -> Self {
        self.working_days = val;
        self
    }

    pub fn custom_field(mut self, name: &str) -> Self {
        self.custom_field = Some(name.to_string());
        self
    }

    pub fn timestamps(mut self, timestamps: Vec<TaskTimestamp>) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// The timestamps a timestamp report covers, in canonical order.
    pub fn effective_timestamps(&self) -> Vec<TaskTimestamp> {
        if self.timestamps.is_empty() {
            return TaskTimestamp::ALL.to_vec();
        }
        TaskTimestamp::ALL
            .into_iter()
            .filter(|ts| self.timestamps.contains(ts))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        validate_headers(&self.columns)?;
        self.filter.validate()?;
        let has_field = self
            .custom_field
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty());
        if self.kind == ReportKind::CustomField && !has_field {
            return Err(Error::invalid("custom-field report needs a custom attribute name"));
        }
        Ok(())
    }
}

/// Positional SQL parameters. Each push hands back its `?N` placeholder.
#[derive(Default)]
pub(crate) struct SqlParams {
    values: Vec<Box<dyn ToSql>>,
}

impl SqlParams {
    pub(crate) fn push(&mut self, value: impl ToSql + 'static) -> String {
        self.values.push(Box::new(value));
        format!("?{}", self.values.len())
    }

    /// Placeholders for a list, joined for use inside `IN (...)`.
    pub(crate) fn push_all<T: ToSql + Clone + 'static>(&mut self, values: &[T]) -> String {
        values
            .iter()
            .map(|v| self.push(v.clone()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    pub(crate) fn as_refs(&self) -> Vec<&dyn ToSql> {
        self.values.iter().map(|p| p.as_ref()).collect()
    }
}
