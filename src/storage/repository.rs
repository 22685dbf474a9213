use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::date_util::date_key;
use crate::model::{Classification, Holiday, StoreStats, Task, Workbasket};

fn timestamp(ts: Option<NaiveDateTime>) -> Option<String> {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

// ── Workbaskets ────────────────────────────────────────────────────

pub fn upsert_workbasket(conn: &Connection, wb: &Workbasket) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO workbaskets (
            id, key, domain, name, org_level_1, org_level_2, org_level_3, org_level_4
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            key=excluded.key, domain=excluded.domain, name=excluded.name,
            org_level_1=excluded.org_level_1, org_level_2=excluded.org_level_2,
            org_level_3=excluded.org_level_3, org_level_4=excluded.org_level_4",
        params![
            wb.id,
            wb.key,
            wb.domain,
            wb.name,
            wb.org_level_1,
            wb.org_level_2,
            wb.org_level_3,
            wb.org_level_4,
        ],
    )?;
    Ok(())
}

// ── Classifications ────────────────────────────────────────────────

pub fn upsert_classification(
    conn: &Connection,
    classification: &Classification,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO classifications (id, key, domain, category, name)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            key=excluded.key, domain=excluded.domain,
            category=excluded.category, name=excluded.name",
        params![
            classification.id,
            classification.key,
            classification.domain,
            classification.category,
            classification.name,
        ],
    )?;
    Ok(())
}

// ── Tasks ──────────────────────────────────────────────────────────

/// Insert or replace a task together with its custom attributes and
/// attachments.
pub fn upsert_task(conn: &Connection, task: &Task) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO tasks (
            id, workbasket_id, classification_id, domain, state,
            created, claimed, completed, modified, planned, due
        ) VALUES (
            ?1, ?2, ?3, COALESCE(?4, (SELECT domain FROM workbaskets WHERE id = ?2)), ?5,
            ?6, ?7, ?8, ?9, ?10, ?11
        )
        ON CONFLICT(id) DO UPDATE SET
            workbasket_id=excluded.workbasket_id, classification_id=excluded.classification_id,
            domain=excluded.domain, state=excluded.state,
            created=excluded.created, claimed=excluded.claimed, completed=excluded.completed,
            modified=excluded.modified, planned=excluded.planned, due=excluded.due",
        params![
            task.id,
            task.workbasket_id,
            task.classification_id,
            task.domain,
            task.state.as_str(),
            timestamp(task.created),
            timestamp(task.claimed),
            timestamp(task.completed),
            timestamp(task.modified),
            timestamp(task.planned),
            timestamp(task.due),
        ],
    )?;

    conn.execute(
        "DELETE FROM task_custom_attributes WHERE task_id = ?1",
        params![task.id],
    )?;
    conn.execute("DELETE FROM attachments WHERE task_id = ?1", params![task.id])?;

    for (name, value) in &task.custom_attributes {
        conn.execute(
            "INSERT INTO task_custom_attributes (task_id, name, value) VALUES (?1, ?2, ?3)",
            params![task.id, name, value],
        )?;
    }

    for attachment in &task.attachments {
        conn.execute(
            "INSERT OR REPLACE INTO attachments (id, task_id, classification_id)
             VALUES (?1, ?2, ?3)",
            params![attachment.id, task.id, attachment.classification_id],
        )?;
    }

    Ok(())
}

// ── Holidays ───────────────────────────────────────────────────────

pub fn add_holiday(
    conn: &Connection,
    date: NaiveDate,
    name: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO holidays (date, name) VALUES (?1, ?2)",
        params![date_key(date), name],
    )?;
    Ok(())
}

pub fn remove_holiday(conn: &Connection, date: NaiveDate) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "DELETE FROM holidays WHERE date = ?1",
        params![date_key(date)],
    )?;
    Ok(count > 0)
}

pub fn list_holidays(conn: &Connection) -> Result<Vec<Holiday>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT date, name FROM holidays ORDER BY date")?;
    let rows = stmt.query_map([], |row| {
        let raw: String = row.get(0)?;
        let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Holiday {
            date,
            name: row.get(1)?,
        })
    })?;
    rows.collect()
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Status ─────────────────────────────────────────────────────────

pub fn store_stats(conn: &Connection) -> Result<StoreStats, rusqlite::Error> {
    let count = |table: &str| -> Result<u64, rusqlite::Error> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(n as u64)
    };
    Ok(StoreStats {
        workbaskets: count("workbaskets")?,
        classifications: count("classifications")?,
        tasks: count("tasks")?,
        holidays: count("holidays")?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{Attachment, TaskState};
    use crate::storage::Database;

    fn workbasket() -> Workbasket {
        Workbasket {
            id: "WBI1".into(),
            key: "WB1".into(),
            domain: "DOMAIN_A".into(),
            name: Some("Basket one".into()),
            org_level_1: Some("sales".into()),
            org_level_2: None,
            org_level_3: None,
            org_level_4: None,
        }
    }

    fn task(id: &str) -> Task {
        Task {
            id: id.into(),
            workbasket_id: "WBI1".into(),
            classification_id: None,
            domain: None,
            state: TaskState::Ready,
            created: None,
            claimed: None,
            completed: None,
            modified: None,
            planned: None,
            due: NaiveDate::from_ymd_opt(2025, 1, 8).and_then(|d| d.and_hms_opt(9, 30, 0)),
            custom_attributes: BTreeMap::from([("region".to_string(), "north".to_string())]),
            attachments: vec![Attachment {
                id: format!("{id}-A"),
                classification_id: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_upsert_task_replaces_children() {
        let db = Database::open_memory().await.unwrap();
        let (domain, attrs, attachments, due) = db
            .writer()
            .call(|conn| {
                upsert_workbasket(conn, &workbasket())?;
                upsert_task(conn, &task("T1"))?;

                let mut changed = task("T1");
                changed.custom_attributes.clear();
                changed.custom_attributes.insert("team".into(), "blue".into());
                upsert_task(conn, &changed)?;

                let domain = conn.query_row("SELECT domain FROM tasks WHERE id = 'T1'", [], |r| {
                    r.get(0)
                })?;
                let attrs = conn.query_row(
                    "SELECT COUNT(*) FROM task_custom_attributes WHERE task_id = 'T1'",
                    [],
                    |r| r.get(0),
                )?;
                let attachments =
                    conn.query_row("SELECT COUNT(*) FROM attachments", [], |r| r.get(0))?;
                let due = conn.query_row("SELECT due FROM tasks WHERE id = 'T1'", [], |r| {
                    r.get(0)
                })?;
                Ok::<(String, i64, i64, String), rusqlite::Error>((domain, attrs, attachments, due))
            })
            .await
            .unwrap();

        assert_eq!(domain, "DOMAIN_A");
        assert_eq!(attrs, 1);
        assert_eq!(attachments, 1);
        assert_eq!(due, "2025-01-08 09:30:00");
    }

    #[tokio::test]
    async fn test_task_requires_known_workbasket() {
        let db = Database::open_memory().await.unwrap();
        let result = db
            .writer()
            .call(|conn| upsert_task(conn, &task("T1")))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_holidays() {
        let db = Database::open_memory().await.unwrap();
        let (removed, missing, holidays) = db
            .writer()
            .call(|conn| {
                let d1 = NaiveDate::from_ymd_opt(2025, 12, 24).unwrap();
                let d2 = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
                add_holiday(conn, d2, None)?;
                add_holiday(conn, d1, Some("Christmas Eve"))?;
                add_holiday(conn, d1, Some("Heiligabend"))?;
                let removed = remove_holiday(conn, d2)?;
                let missing = remove_holiday(conn, d2)?;
                Ok::<_, rusqlite::Error>((removed, missing, list_holidays(conn)?))
            })
            .await
            .unwrap();
        assert!(removed);
        assert!(!missing);
        assert_eq!(holidays.len(), 1);
        assert_eq!(holidays[0].name.as_deref(), Some("Heiligabend"));
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();
        let (value, missing, all) = db
            .writer()
            .call(|conn| {
                set_config(conn, "weekend_days", "fri,sat")?;
                set_config(conn, "german_public_holidays", "true")?;
                Ok::<_, rusqlite::Error>((
                    get_config(conn, "weekend_days")?,
                    get_config(conn, "nope")?,
                    list_config(conn)?,
                ))
            })
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("fri,sat"));
        assert_eq!(missing, None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "german_public_holidays");
    }

    #[tokio::test]
    async fn test_store_stats() {
        let db = Database::open_memory().await.unwrap();
        let stats = db
            .writer()
            .call(|conn| {
                upsert_workbasket(conn, &workbasket())?;
                upsert_task(conn, &task("T1"))?;
                upsert_task(conn, &task("T2"))?;
                store_stats(conn)
            })
            .await
            .unwrap();
        assert_eq!(stats.workbaskets, 1);
        assert_eq!(stats.tasks, 2);
        assert_eq!(stats.holidays, 0);
    }
}
