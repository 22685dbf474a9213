pub mod calendar;
pub mod date_util;
pub mod error;
pub mod import;
pub mod model;
pub mod query;
pub mod report;
pub mod storage;

use std::sync::Arc;

use chrono::NaiveDate;

pub use calendar::{DaysBefore, HolidayCalendar, WorkingDayCalendar};
pub use error::{Error, Result};
pub use import::{ImportDocument, ImportReport};
pub use model::{Holiday, StoreStats, TaskState, TaskTimestamp};
pub use query::{ReportFilter, ReportRequest};
pub use report::{
    AgeRange, ColumnHeader, ConverterCache, DayOffsetConverter, Report, ReportKind, ReportRow,
    ResolvedSelection, SelectedItem,
};
pub use storage::Database;

use query::report_sql;
use storage::repository;

/// Config key holding the comma-separated weekend days.
pub const WEEKEND_DAYS_KEY: &str = "weekend_days";
/// Config key switching the German public holidays on (`true`) or off.
pub const GERMAN_HOLIDAYS_KEY: &str = "german_public_holidays";
const DEFAULT_WEEKEND_DAYS: &str = "sat,sun";

/// Main entry point for the monitoring reports.
pub struct TaskMonitor {
    db: Database,
    converters: ConverterCache,
}

impl TaskMonitor {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            converters: ConverterCache::new(),
        }
    }

    // ── Reports ────────────────────────────────────────────────────

    /// Build the report `request` describes.
    pub async fn report(&self, request: &ReportRequest) -> Result<Report> {
        let (report, _) = self.build_report(request).await?;
        Ok(report)
    }

    async fn build_report(
        &self,
        request: &ReportRequest,
    ) -> Result<(Report, Option<Arc<DayOffsetConverter>>)> {
        request.validate()?;
        let converter = if request.working_days {
            Some(
                self.converter(&request.columns, request.reference_date)
                    .await?,
            )
        } else {
            None
        };

        let samples = self
            .db
            .reader()
            .call({
                let request = request.clone();
                move |conn| report_sql::age_samples(conn, &request)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let report = report::aggregate(
            request.kind,
            samples,
            &request.columns,
            converter.as_deref(),
            request.reference_date,
        )?;
        log::info!(
            "Built {} report for {} with {} rows",
            report.kind,
            report.reference_date,
            report.row_count()
        );
        Ok((report, converter))
    }

    /// Ids of the tasks behind the selected cells of the report `request`
    /// describes. The report is rebuilt so selections are checked against
    /// current data.
    pub async fn list_task_ids_for_selected_items(
        &self,
        request: &ReportRequest,
        selections: &[SelectedItem],
    ) -> Result<Vec<String>> {
        let (report, converter) = self.build_report(request).await?;
        let resolved = report::resolve(&report, selections, converter.as_deref())?;

        self.db
            .reader()
            .call({
                let request = request.clone();
                move |conn| report_sql::task_ids_for_selections(conn, &request, &resolved)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Distinct values of custom attribute `name` among the filtered tasks.
    pub async fn list_custom_attribute_values_for_custom_attribute_name(
        &self,
        filter: &ReportFilter,
        name: &str,
    ) -> Result<Vec<String>> {
        if name.trim().is_empty() {
            return Err(Error::invalid("custom attribute name must not be empty"));
        }
        filter.validate()?;
        self.db
            .reader()
            .call({
                let filter = filter.clone();
                let name = name.to_string();
                move |conn| report_sql::custom_attribute_values(conn, &filter, &name)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Calendar ───────────────────────────────────────────────────

    /// The working-day calendar from config and the holidays table.
    pub async fn calendar(&self) -> Result<HolidayCalendar> {
        let (weekend, german, holidays) = self
            .db
            .reader()
            .call(|conn| {
                let weekend = repository::get_config(conn, WEEKEND_DAYS_KEY)?;
                let german = repository::get_config(conn, GERMAN_HOLIDAYS_KEY)?;
                let holidays = repository::list_holidays(conn)?;
                Ok::<_, rusqlite::Error>((weekend, german, holidays))
            })
            .await?;

        let weekend = date_util::parse_weekdays(weekend.as_deref().unwrap_or(DEFAULT_WEEKEND_DAYS))
            .map_err(|e| Error::Config(format!("{WEEKEND_DAYS_KEY}: {e}")))?;
        let german = match german.as_deref() {
            Some(value) => parse_bool(value)
                .map_err(|e| Error::Config(format!("{GERMAN_HOLIDAYS_KEY}: {e}")))?,
            None => false,
        };
        Ok(HolidayCalendar::new()
            .with_weekend(weekend)
            .with_german_public_holidays(german)
            .with_holidays(holidays.into_iter().map(|h| h.date)))
    }

    /// The shared converter for `headers` around `reference_date`.
    ///
    /// Ages are positive for overdue tasks, so the tables walk the calendar
    /// backwards from the reference date for positive ages.
    pub async fn converter(
        &self,
        headers: &[ColumnHeader],
        reference_date: NaiveDate,
    ) -> Result<Arc<DayOffsetConverter>> {
        let calendar = DaysBefore(self.calendar().await?);
        self.converters
            .get_or_build(headers, reference_date, &calendar)
    }

    pub async fn holiday_add(&self, date: NaiveDate, name: Option<&str>) -> Result<()> {
        self.db
            .writer()
            .call({
                let name = name.map(|s| s.to_string());
                move |conn| repository::add_holiday(conn, date, name.as_deref())
            })
            .await?;
        self.converters.clear();
        Ok(())
    }

    pub async fn holiday_remove(&self, date: NaiveDate) -> Result<bool> {
        let removed = self
            .db
            .writer()
            .call(move |conn| repository::remove_holiday(conn, date))
            .await?;
        if removed {
            self.converters.clear();
        }
        Ok(removed)
    }

    pub async fn holiday_list(&self) -> Result<Vec<Holiday>> {
        self.db
            .reader()
            .call(|conn| repository::list_holidays(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Import / status ────────────────────────────────────────────

    pub async fn import(&self, doc: ImportDocument) -> Result<ImportReport> {
        let has_holidays = !doc.holidays.is_empty();
        let report = self
            .db
            .writer()
            .call(move |conn| import::apply(conn, &doc))
            .await
            .map_err(|e| Error::Import(e.to_string()))?;
        if has_holidays {
            self.converters.clear();
        }
        log::info!(
            "Imported {} tasks, {} workbaskets, {} classifications, {} holidays",
            report.tasks,
            report.workbaskets,
            report.classifications,
            report.holidays
        );
        Ok(report)
    }

    pub async fn status(&self) -> Result<StoreStats> {
        self.db
            .reader()
            .call(|conn| repository::store_stats(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Set a config value. Calendar keys are checked before they are stored.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        match key {
            WEEKEND_DAYS_KEY => {
                date_util::parse_weekdays(value)?;
            }
            GERMAN_HOLIDAYS_KEY => {
                parse_bool(value)?;
            }
            _ => {}
        }
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        if key == WEEKEND_DAYS_KEY || key == GERMAN_HOLIDAYS_KEY {
            self.converters.clear();
        }
        Ok(())
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(Error::invalid(format!("expected true or false, got '{other}'"))),
    }
}
