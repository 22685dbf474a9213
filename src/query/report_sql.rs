//! SQL behind the monitoring reports: per-group age samples, the task-id
//! lookup for resolved selections, and distinct custom attribute values.
//!
//! The age of a task is `reference_date - date(timestamp)` in whole days,
//! computed by SQLite. Callers validate the request before calling in.

use rusqlite::Connection;

use super::{ReportFilter, ReportRequest, SqlParams};
use crate::date_util::date_key;
use crate::model::TaskTimestamp;
use crate::report::{AgeRange, AgeSample, ReportKind, ResolvedSelection, NO_VALUE};

const TASKS: &str = "tasks t \
     JOIN workbaskets w ON w.id = t.workbasket_id \
     LEFT JOIN classifications c ON c.id = t.classification_id";

/// Where a report's rows come from: key expressions, the age expression and
/// the FROM clause they are evaluated over.
struct Source {
    keys: Vec<String>,
    age: String,
    from: String,
    conditions: Vec<String>,
}

fn or_no_value(expr: &str) -> String {
    format!("COALESCE({expr}, '{NO_VALUE}')")
}

fn age_of(column: &str, reference: &str) -> String {
    format!("CAST(julianday({reference}) - julianday(date({column})) AS INTEGER)")
}

fn source(request: &ReportRequest, params: &mut SqlParams) -> Source {
    let reference = params.push(date_key(request.reference_date));
    let due_age = age_of("t.due", &reference);

    match request.kind {
        ReportKind::Workbasket => Source {
            keys: vec!["w.key".to_string()],
            age: due_age,
            from: TASKS.to_string(),
            conditions: Vec::new(),
        },
        ReportKind::Category => Source {
            keys: vec![or_no_value("c.category")],
            age: due_age,
            from: TASKS.to_string(),
            conditions: Vec::new(),
        },
        ReportKind::Classification => Source {
            keys: vec![or_no_value("c.key")],
            age: due_age,
            from: TASKS.to_string(),
            conditions: Vec::new(),
        },
        ReportKind::DetailedClassification => Source {
            keys: vec![or_no_value("c.key"), or_no_value("ac.key")],
            age: due_age,
            from: format!(
                "{TASKS} \
                 LEFT JOIN attachments a ON a.task_id = t.id \
                 LEFT JOIN classifications ac ON ac.id = a.classification_id"
            ),
            conditions: Vec::new(),
        },
        ReportKind::CustomField => {
            let name = params.push(request.custom_field.clone().unwrap_or_default());
            Source {
                keys: vec![or_no_value("ca.value")],
                age: due_age,
                from: format!(
                    "{TASKS} \
                     LEFT JOIN task_custom_attributes ca ON ca.task_id = t.id AND ca.name = {name}"
                ),
                conditions: Vec::new(),
            }
        }
        ReportKind::Timestamp => {
            let events = request
                .effective_timestamps()
                .iter()
                .map(|ts| timestamp_select(*ts))
                .collect::<Vec<_>>()
                .join(" UNION ALL ");
            Source {
                keys: vec![
                    "tsx.kind".to_string(),
                    or_no_value("w.org_level_1"),
                    or_no_value("w.org_level_2"),
                    or_no_value("w.org_level_3"),
                    or_no_value("w.org_level_4"),
                ],
                age: age_of("tsx.ts", &reference),
                from: format!(
                    "({events}) tsx \
                     JOIN tasks t ON t.id = tsx.task_id \
                     JOIN workbaskets w ON w.id = t.workbasket_id \
                     LEFT JOIN classifications c ON c.id = t.classification_id"
                ),
                conditions: vec!["tsx.ts IS NOT NULL".to_string()],
            }
        }
    }
}

fn timestamp_select(ts: TaskTimestamp) -> String {
    format!(
        "SELECT id AS task_id, '{}' AS kind, {} AS ts FROM tasks",
        ts.as_str(),
        ts.column()
    )
}

fn where_clause(wheres: &[String]) -> String {
    if wheres.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", wheres.join(" AND "))
    }
}

/// Count distinct tasks per (key path, age), ordered by key path then age.
pub fn age_samples(
    conn: &Connection,
    request: &ReportRequest,
) -> Result<Vec<AgeSample>, rusqlite::Error> {
    let mut params = SqlParams::default();
    let source = source(request, &mut params);
    let mut wheres = source.conditions.clone();
    wheres.extend(request.filter.conditions(&mut params));

    let keys = source.keys.join(", ");
    let sql = format!(
        "SELECT {keys}, {age} AS age, COUNT(DISTINCT t.id) FROM {from}{where_sql} \
         GROUP BY {keys}, age ORDER BY {keys}, age",
        age = source.age,
        from = source.from,
        where_sql = where_clause(&wheres),
    );
    log::trace!("age samples: {sql}");

    let width = source.keys.len();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_refs().as_slice(), |row| {
        let key_path = (0..width)
            .map(|i| row.get::<_, String>(i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AgeSample {
            key_path,
            age_in_days: row.get(width)?,
            count: row.get::<_, i64>(width + 1)? as u64,
        })
    })?;
    rows.collect()
}

/// Age predicate matching any of `ranges`; never true for a task without age.
fn age_condition(age: &str, ranges: &[AgeRange], params: &mut SqlParams) -> String {
    if ranges.is_empty() {
        return "0".to_string();
    }
    let parts: Vec<String> = ranges
        .iter()
        .map(|range| match (range.lower, range.upper) {
            (Some(lo), Some(hi)) => {
                let lo = params.push(lo);
                let hi = params.push(hi);
                format!("({age} >= {lo} AND {age} < {hi})")
            }
            (Some(lo), None) => format!("{age} >= {}", params.push(lo)),
            (None, Some(hi)) => format!("{age} < {}", params.push(hi)),
            (None, None) => format!("{age} IS NOT NULL"),
        })
        .collect();
    format!("({})", parts.join(" OR "))
}

/// Distinct ids of the tasks behind `selections`, sorted.
pub fn task_ids_for_selections(
    conn: &Connection,
    request: &ReportRequest,
    selections: &[ResolvedSelection],
) -> Result<Vec<String>, rusqlite::Error> {
    if selections.is_empty() {
        return Ok(Vec::new());
    }

    let mut params = SqlParams::default();
    let source = source(request, &mut params);
    let mut wheres = source.conditions.clone();
    wheres.extend(request.filter.conditions(&mut params));

    let alternatives: Vec<String> = selections
        .iter()
        .map(|selection| {
            let mut parts: Vec<String> = source
                .keys
                .iter()
                .zip(&selection.key_path)
                .map(|(key, value)| format!("{key} = {}", params.push(value.clone())))
                .collect();
            parts.push(age_condition(&source.age, &selection.ages, &mut params));
            format!("({})", parts.join(" AND "))
        })
        .collect();
    wheres.push(format!("({})", alternatives.join(" OR ")));

    let sql = format!(
        "SELECT DISTINCT t.id FROM {}{} ORDER BY t.id",
        source.from,
        where_clause(&wheres)
    );
    log::trace!("selected task ids: {sql}");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_refs().as_slice(), |row| row.get(0))?;
    rows.collect()
}

/// Distinct values of custom attribute `name` among the filtered tasks, sorted.
pub fn custom_attribute_values(
    conn: &Connection,
    filter: &ReportFilter,
    name: &str,
) -> Result<Vec<String>, rusqlite::Error> {
    let mut params = SqlParams::default();
    let name = params.push(name.to_string());
    let wheres = filter.conditions(&mut params);
    let sql = format!(
        "SELECT DISTINCT ca.value FROM {TASKS} \
         JOIN task_custom_attributes ca ON ca.task_id = t.id AND ca.name = {name}{} \
         ORDER BY ca.value",
        where_clause(&wheres)
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_refs().as_slice(), |row| row.get(0))?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::model::{Attachment, Classification, Task, TaskState, Workbasket};
    use crate::report::header::parse_columns;
    use crate::storage::{repository, Database};

    fn wednesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 8).unwrap()
    }

    fn workbasket(id: &str, key: &str, org: Option<&str>) -> Workbasket {
        Workbasket {
            id: id.into(),
            key: key.into(),
            domain: "DOMAIN_A".into(),
            name: None,
            org_level_1: org.map(Into::into),
            org_level_2: None,
            org_level_3: None,
            org_level_4: None,
        }
    }

    fn classification(id: &str, key: &str, category: &str) -> Classification {
        Classification {
            id: id.into(),
            key: key.into(),
            domain: "DOMAIN_A".into(),
            category: Some(category.into()),
            name: None,
        }
    }

    /// A task due `days_overdue` days before the reference date.
    fn task(id: &str, wb: &str, class: Option<&str>, days_overdue: Option<i64>) -> Task {
        Task {
            id: id.into(),
            workbasket_id: wb.into(),
            classification_id: class.map(Into::into),
            domain: None,
            state: TaskState::Ready,
            created: wednesday().and_hms_opt(8, 0, 0),
            claimed: None,
            completed: None,
            modified: None,
            planned: None,
            due: days_overdue.and_then(|d| {
                (wednesday() - chrono::Duration::days(d)).and_hms_opt(17, 45, 0)
            }),
            custom_attributes: BTreeMap::new(),
            attachments: Vec::new(),
        }
    }

    async fn seeded() -> Database {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::upsert_workbasket(conn, &workbasket("WBI1", "WB1", Some("sales")))?;
                repository::upsert_workbasket(conn, &workbasket("WBI2", "WB2", None))?;
                repository::upsert_classification(conn, &classification("CLI1", "L1", "EXTERN"))?;
                repository::upsert_classification(conn, &classification("CLI2", "L2", "MANUAL"))?;
                repository::upsert_classification(conn, &classification("CLA1", "A1", "EXTERN"))?;

                let mut t1 = task("T1", "WBI1", Some("CLI1"), Some(0));
                t1.custom_attributes.insert("region".into(), "north".into());
                t1.attachments.push(Attachment {
                    id: "T1-A".into(),
                    classification_id: Some("CLA1".into()),
                });
                let mut t2 = task("T2", "WBI1", Some("CLI1"), Some(0));
                t2.custom_attributes.insert("region".into(), "south".into());
                let mut t3 = task("T3", "WBI1", Some("CLI2"), Some(6));
                t3.state = TaskState::Claimed;
                t3.custom_attributes.insert("region".into(), "north".into());
                let t4 = task("T4", "WBI2", None, Some(-3));
                let t5 = task("T5", "WBI2", Some("CLI2"), None);

                for t in [t1, t2, t3, t4, t5] {
                    repository::upsert_task(conn, &t)?;
                }
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        db
    }

    async fn samples(db: &Database, request: ReportRequest) -> Vec<AgeSample> {
        db.reader()
            .call(move |conn| age_samples(conn, &request))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_workbasket_samples() {
        let db = seeded().await;
        let got = samples(&db, ReportRequest::new(ReportKind::Workbasket, wednesday())).await;
        assert_eq!(
            got,
            vec![
                AgeSample::new(["WB1"], Some(0), 2),
                AgeSample::new(["WB1"], Some(6), 1),
                AgeSample::new(["WB2"], None, 1),
                AgeSample::new(["WB2"], Some(-3), 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_filtered_samples() {
        let db = seeded().await;
        let request = ReportRequest::new(ReportKind::Workbasket, wednesday())
            .filter(ReportFilter::new().state(TaskState::Ready).workbasket("WBI1"));
        assert_eq!(
            samples(&db, request).await,
            vec![AgeSample::new(["WB1"], Some(0), 2)]
        );

        let request = ReportRequest::new(ReportKind::Workbasket, wednesday())
            .filter(ReportFilter::new().custom_attribute("region", "north"));
        let got = samples(&db, request).await;
        assert_eq!(got.iter().map(|s| s.count).sum::<u64>(), 2);

        let request = ReportRequest::new(ReportKind::Workbasket, wednesday())
            .filter(ReportFilter::new().exclude_classification("CLI1"));
        let got = samples(&db, request).await;
        assert_eq!(got.iter().map(|s| s.count).sum::<u64>(), 3);

        let request = ReportRequest::new(ReportKind::Workbasket, wednesday())
            .filter(ReportFilter::new().category("MANUAL"));
        let got = samples(&db, request).await;
        assert_eq!(got.iter().map(|s| s.count).sum::<u64>(), 2);
    }

    #[tokio::test]
    async fn test_category_and_classification_samples() {
        let db = seeded().await;
        let got = samples(&db, ReportRequest::new(ReportKind::Category, wednesday())).await;
        let keys: Vec<&str> = got.iter().map(|s| s.key_path[0].as_str()).collect();
        assert_eq!(keys, vec!["EXTERN", "MANUAL", "MANUAL", NO_VALUE]);

        let got = samples(&db, ReportRequest::new(ReportKind::Classification, wednesday())).await;
        assert_eq!(got[0], AgeSample::new(["L1"], Some(0), 2));
    }

    #[tokio::test]
    async fn test_detailed_classification_samples() {
        let db = seeded().await;
        let got = samples(
            &db,
            ReportRequest::new(ReportKind::DetailedClassification, wednesday()),
        )
        .await;
        assert!(got.contains(&AgeSample::new(["L1", "A1"], Some(0), 1)));
        assert!(got.contains(&AgeSample::new(["L1", NO_VALUE], Some(0), 1)));
        assert!(got.contains(&AgeSample::new([NO_VALUE, NO_VALUE], Some(-3), 1)));
    }

    #[tokio::test]
    async fn test_custom_field_samples() {
        let db = seeded().await;
        let request =
            ReportRequest::new(ReportKind::CustomField, wednesday()).custom_field("region");
        let got = samples(&db, request).await;
        assert!(got.contains(&AgeSample::new(["north"], Some(0), 1)));
        assert!(got.contains(&AgeSample::new(["north"], Some(6), 1)));
        assert!(got.contains(&AgeSample::new(["south"], Some(0), 1)));
        assert!(got.contains(&AgeSample::new([NO_VALUE], Some(-3), 1)));
    }

    #[tokio::test]
    async fn test_timestamp_samples() {
        let db = seeded().await;
        let request = ReportRequest::new(ReportKind::Timestamp, wednesday())
            .timestamps(vec![TaskTimestamp::Created, TaskTimestamp::Completed]);
        let got = samples(&db, request).await;
        // Every task was created on the reference date; none is completed.
        assert_eq!(
            got,
            vec![
                AgeSample::new(["CREATED", NO_VALUE, NO_VALUE, NO_VALUE, NO_VALUE], Some(0), 2),
                AgeSample::new(["CREATED", "sales", NO_VALUE, NO_VALUE, NO_VALUE], Some(0), 3),
            ]
        );
    }

    #[tokio::test]
    async fn test_task_ids_for_selections() {
        let db = seeded().await;
        let request = ReportRequest::new(ReportKind::Workbasket, wednesday())
            .columns(parse_columns("..0,0,1..5,5..").unwrap());
        let selections = vec![
            ResolvedSelection {
                key_path: vec!["WB1".into()],
                column: 1,
                ages: vec![AgeRange::single(0)],
            },
            ResolvedSelection {
                key_path: vec!["WB2".into()],
                column: 0,
                ages: vec![AgeRange::new(None, Some(0))],
            },
        ];
        let ids = db
            .reader()
            .call(move |conn| task_ids_for_selections(conn, &request, &selections))
            .await
            .unwrap();
        assert_eq!(ids, vec!["T1", "T2", "T4"]);
    }

    #[tokio::test]
    async fn test_unbounded_selection_skips_tasks_without_age() {
        let db = seeded().await;
        let request = ReportRequest::new(ReportKind::Workbasket, wednesday());
        let selections = vec![ResolvedSelection {
            key_path: vec!["WB2".into()],
            column: 0,
            ages: vec![AgeRange::new(None, None)],
        }];
        let ids = db
            .reader()
            .call(move |conn| task_ids_for_selections(conn, &request, &selections))
            .await
            .unwrap();
        assert_eq!(ids, vec!["T4"]);
    }

    #[tokio::test]
    async fn test_custom_attribute_values() {
        let db = seeded().await;
        let (all, ready) = db
            .reader()
            .call(|conn| {
                let all = custom_attribute_values(conn, &ReportFilter::new(), "region")?;
                let claimed = ReportFilter::new().state(TaskState::Claimed);
                let ready = custom_attribute_values(conn, &claimed, "region")?;
                Ok::<_, rusqlite::Error>((all, ready))
            })
            .await
            .unwrap();
        assert_eq!(all, vec!["north", "south"]);
        assert_eq!(ready, vec!["north"]);
    }
}
