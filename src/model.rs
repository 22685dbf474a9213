use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbasket {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub org_level_1: Option<String>,
    #[serde(default)]
    pub org_level_2: Option<String>,
    #[serde(default)]
    pub org_level_3: Option<String>,
    #[serde(default)]
    pub org_level_4: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    #[serde(default)]
    pub classification_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Ready,
    Claimed,
    Completed,
    Cancelled,
    Terminated,
}

impl TaskState {
    pub const ALL: [TaskState; 5] = [
        TaskState::Ready,
        TaskState::Claimed,
        TaskState::Completed,
        TaskState::Cancelled,
        TaskState::Terminated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Ready => "READY",
            TaskState::Claimed => "CLAIMED",
            TaskState::Completed => "COMPLETED",
            TaskState::Cancelled => "CANCELLED",
            TaskState::Terminated => "TERMINATED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::invalid(format!("unknown task state: {s}")))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task life-cycle timestamps a timestamp report can age against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskTimestamp {
    Created,
    Claimed,
    Completed,
    Modified,
    Planned,
    Due,
}

impl TaskTimestamp {
    pub const ALL: [TaskTimestamp; 6] = [
        TaskTimestamp::Created,
        TaskTimestamp::Claimed,
        TaskTimestamp::Completed,
        TaskTimestamp::Modified,
        TaskTimestamp::Planned,
        TaskTimestamp::Due,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskTimestamp::Created => "CREATED",
            TaskTimestamp::Claimed => "CLAIMED",
            TaskTimestamp::Completed => "COMPLETED",
            TaskTimestamp::Modified => "MODIFIED",
            TaskTimestamp::Planned => "PLANNED",
            TaskTimestamp::Due => "DUE",
        }
    }

    /// Column of the `tasks` table holding this timestamp.
    pub fn column(&self) -> &'static str {
        match self {
            TaskTimestamp::Created => "created",
            TaskTimestamp::Claimed => "claimed",
            TaskTimestamp::Completed => "completed",
            TaskTimestamp::Modified => "modified",
            TaskTimestamp::Planned => "planned",
            TaskTimestamp::Due => "due",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|ts| ts.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::invalid(format!("unknown task timestamp: {s}")))
    }
}

impl fmt::Display for TaskTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub workbasket_id: String,
    #[serde(default)]
    pub classification_id: Option<String>,
    /// Defaults to the workbasket's domain.
    #[serde(default)]
    pub domain: Option<String>,
    pub state: TaskState,
    #[serde(default)]
    pub created: Option<NaiveDateTime>,
    #[serde(default)]
    pub claimed: Option<NaiveDateTime>,
    #[serde(default)]
    pub completed: Option<NaiveDateTime>,
    #[serde(default)]
    pub modified: Option<NaiveDateTime>,
    #[serde(default)]
    pub planned: Option<NaiveDateTime>,
    #[serde(default)]
    pub due: Option<NaiveDateTime>,
    #[serde(default)]
    pub custom_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    #[serde(default)]
    pub name: Option<String>,
}

/// Row counts of the store, for `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub workbaskets: u64,
    pub classifications: u64,
    pub tasks: u64,
    pub holidays: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_parse() {
        assert_eq!(TaskState::parse("ready").unwrap(), TaskState::Ready);
        assert_eq!(TaskState::parse(" CLAIMED ").unwrap(), TaskState::Claimed);
        assert!(TaskState::parse("open").is_err());
    }

    #[test]
    fn test_task_timestamp_parse() {
        assert_eq!(TaskTimestamp::parse("due").unwrap(), TaskTimestamp::Due);
        assert_eq!(TaskTimestamp::Planned.column(), "planned");
        assert!(TaskTimestamp::parse("deleted").is_err());
    }

    #[test]
    fn test_task_deserialize_defaults() {
        let task: Task = serde_json::from_str(
            r#"{"id":"T1","workbasket_id":"WB1","state":"READY","due":"2025-01-08T12:00:00"}"#,
        )
        .unwrap();
        assert_eq!(task.state, TaskState::Ready);
        assert!(task.custom_attributes.is_empty());
        assert!(task.attachments.is_empty());
        assert_eq!(
            task.due.map(|d| d.date()),
            NaiveDate::from_ymd_opt(2025, 1, 8)
        );
    }
}
