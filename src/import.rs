//! JSON import of workbaskets, classifications, tasks and holidays.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Classification, Holiday, Task, Workbasket};
use crate::storage::repository;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportDocument {
    pub workbaskets: Vec<Workbasket>,
    pub classifications: Vec<Classification>,
    pub tasks: Vec<Task>,
    pub holidays: Vec<Holiday>,
}

impl ImportDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_empty(&self) -> bool {
        self.workbaskets.is_empty()
            && self.classifications.is_empty()
            && self.tasks.is_empty()
            && self.holidays.is_empty()
    }
}

/// Number of records written per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub workbaskets: usize,
    pub classifications: usize,
    pub tasks: usize,
    pub holidays: usize,
}

/// Write the whole document in one transaction. Nothing is kept if any
/// record fails, e.g. a task pointing at an unknown workbasket.
pub fn apply(
    conn: &mut Connection,
    doc: &ImportDocument,
) -> std::result::Result<ImportReport, rusqlite::Error> {
    let tx = conn.transaction()?;
    for wb in &doc.workbaskets {
        repository::upsert_workbasket(&tx, wb)?;
    }
    for classification in &doc.classifications {
        repository::upsert_classification(&tx, classification)?;
    }
    for task in &doc.tasks {
        repository::upsert_task(&tx, task)?;
    }
    for holiday in &doc.holidays {
        repository::add_holiday(&tx, holiday.date, holiday.name.as_deref())?;
    }
    tx.commit()?;

    Ok(ImportReport {
        workbaskets: doc.workbaskets.len(),
        classifications: doc.classifications.len(),
        tasks: doc.tasks.len(),
        holidays: doc.holidays.len(),
    })
}
