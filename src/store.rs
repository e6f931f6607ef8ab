//! Record-storage contract for the catalog and the per-user placement rows,
//! plus the SQLite-backed implementation the sidecar uses.

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::Month;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    pub grade: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub subject_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_level")]
    pub difficulty_level: i64,
    #[serde(default = "default_level")]
    pub importance_level: i64,
    #[serde(default)]
    pub lgs_frequency: i64,
}

fn default_level() -> i64 {
    1
}

/// Natural key of a placement row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlacementKey {
    pub user_id: String,
    pub topic_id: String,
    pub month: Month,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub id: String,
    pub user_id: String,
    pub topic_id: String,
    pub planned_month: i64,
    pub planned_year: i32,
    pub test_accuracy: Option<f64>,
    pub exam_accuracy: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    /// Every row for the topic, regardless of year.
    AllYears,
    Year(i32),
    /// Stale rows: every month of `year` except `keep`.
    YearExcept { year: i32, keep: Month },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Test,
    Exam,
}

impl MetricKind {
    fn column(self) -> &'static str {
        match self {
            MetricKind::Test => "test_accuracy",
            MetricKind::Exam => "exam_accuracy",
        }
    }
}

pub trait TopicCatalog {
    fn list_subjects(&self, grade: i64) -> Result<Vec<Subject>, StoreError>;
    fn list_topics(&self, subject_ids: &[String]) -> Result<Vec<Topic>, StoreError>;
}

pub trait PlacementStore {
    /// Rows for one user and year, oldest first.
    fn list_placements(&self, user_id: &str, year: i32) -> Result<Vec<Placement>, StoreError>;
    /// Insert-or-touch on the natural key. A new row inherits metrics from the
    /// topic's other rows in the same year.
    fn upsert_placement(&self, key: &PlacementKey) -> Result<Placement, StoreError>;
    fn delete_placements(
        &self,
        user_id: &str,
        topic_id: &str,
        scope: DeleteScope,
    ) -> Result<usize, StoreError>;
    /// Writes a metric onto existing rows only; returns the number touched.
    fn set_topic_metric(
        &self,
        user_id: &str,
        topic_id: &str,
        year: i32,
        kind: MetricKind,
        value: f64,
    ) -> Result<usize, StoreError>;
}

pub fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Replaces-or-inserts catalog rows; existing ids are updated in place.
    pub fn import_catalog(&self, subjects: &[Subject], topics: &[Topic]) -> Result<(usize, usize), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        for (i, s) in subjects.iter().enumerate() {
            tx.execute(
                "INSERT INTO subjects(id, name, code, color, icon, grade, sort_order)
                 VALUES(?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    code = excluded.code,
                    color = excluded.color,
                    icon = excluded.icon,
                    grade = excluded.grade,
                    sort_order = excluded.sort_order",
                params![s.id, s.name, s.code, s.color, s.icon, s.grade, i as i64],
            )?;
        }
        for (i, t) in topics.iter().enumerate() {
            let known = tx
                .query_row("SELECT 1 FROM subjects WHERE id = ?", [&t.subject_id], |_r| Ok(()))
                .optional()?;
            if known.is_none() {
                return Err(StoreError::Unavailable(format!(
                    "topic {} references unknown subject {}",
                    t.id, t.subject_id
                )));
            }
            tx.execute(
                "INSERT INTO topics(id, subject_id, name, description, difficulty_level, importance_level, lgs_frequency, sort_order)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    subject_id = excluded.subject_id,
                    name = excluded.name,
                    description = excluded.description,
                    difficulty_level = excluded.difficulty_level,
                    importance_level = excluded.importance_level,
                    lgs_frequency = excluded.lgs_frequency,
                    sort_order = excluded.sort_order",
                params![
                    t.id,
                    t.subject_id,
                    t.name,
                    t.description,
                    t.difficulty_level,
                    t.importance_level,
                    t.lgs_frequency,
                    i as i64
                ],
            )?;
        }
        tx.commit()?;
        Ok((subjects.len(), topics.len()))
    }

    fn placement_by_key(&self, key: &PlacementKey) -> Result<Option<Placement>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, user_id, topic_id, planned_month, planned_year, test_accuracy, exam_accuracy, created_at, updated_at
                 FROM placements
                 WHERE user_id = ? AND topic_id = ? AND planned_month = ? AND planned_year = ?",
                params![key.user_id, key.topic_id, key.month.number(), key.year],
                placement_from_row,
            )
            .optional()?;
        Ok(row)
    }
}

fn placement_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Placement> {
    Ok(Placement {
        id: r.get(0)?,
        user_id: r.get(1)?,
        topic_id: r.get(2)?,
        planned_month: r.get(3)?,
        planned_year: r.get(4)?,
        test_accuracy: r.get(5)?,
        exam_accuracy: r.get(6)?,
        created_at: r.get(7)?,
        updated_at: r.get(8)?,
    })
}

impl TopicCatalog for SqliteStore<'_> {
    fn list_subjects(&self, grade: i64) -> Result<Vec<Subject>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, code, color, icon, grade
             FROM subjects
             WHERE grade = ?
             ORDER BY sort_order, id",
        )?;
        let rows = stmt
            .query_map([grade], |r| {
                Ok(Subject {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    code: r.get(2)?,
                    color: r.get(3)?,
                    icon: r.get(4)?,
                    grade: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_topics(&self, subject_ids: &[String]) -> Result<Vec<Topic>, StoreError> {
        if subject_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; subject_ids.len()].join(", ");
        let sql = format!(
            "SELECT t.id, t.subject_id, t.name, t.description, t.difficulty_level, t.importance_level, t.lgs_frequency
             FROM topics t
             JOIN subjects s ON s.id = t.subject_id
             WHERE t.subject_id IN ({})
             ORDER BY s.sort_order, t.sort_order, t.id",
            placeholders
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(subject_ids.iter()), |r| {
                Ok(Topic {
                    id: r.get(0)?,
                    subject_id: r.get(1)?,
                    name: r.get(2)?,
                    description: r.get(3)?,
                    difficulty_level: r.get(4)?,
                    importance_level: r.get(5)?,
                    lgs_frequency: r.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl PlacementStore for SqliteStore<'_> {
    fn list_placements(&self, user_id: &str, year: i32) -> Result<Vec<Placement>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, topic_id, planned_month, planned_year, test_accuracy, exam_accuracy, created_at, updated_at
             FROM placements
             WHERE user_id = ? AND planned_year = ?
             ORDER BY created_at, rowid",
        )?;
        let rows = stmt
            .query_map(params![user_id, year], placement_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn upsert_placement(&self, key: &PlacementKey) -> Result<Placement, StoreError> {
        let ts = now_stamp();
        self.conn.execute(
            "INSERT INTO placements(
                id, user_id, topic_id, planned_month, planned_year, test_accuracy, exam_accuracy, created_at, updated_at
             ) VALUES(
                ?1, ?2, ?3, ?4, ?5,
                (SELECT test_accuracy FROM placements
                  WHERE user_id = ?2 AND topic_id = ?3 AND planned_year = ?5 AND test_accuracy IS NOT NULL
                  ORDER BY updated_at DESC LIMIT 1),
                (SELECT exam_accuracy FROM placements
                  WHERE user_id = ?2 AND topic_id = ?3 AND planned_year = ?5 AND exam_accuracy IS NOT NULL
                  ORDER BY updated_at DESC LIMIT 1),
                ?6, ?6
             )
             ON CONFLICT(user_id, topic_id, planned_month, planned_year)
             DO UPDATE SET updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                key.user_id,
                key.topic_id,
                key.month.number(),
                key.year,
                ts
            ],
        )?;
        self.placement_by_key(key)?
            .ok_or_else(|| StoreError::Unavailable("placement vanished after upsert".to_string()))
    }

    fn delete_placements(
        &self,
        user_id: &str,
        topic_id: &str,
        scope: DeleteScope,
    ) -> Result<usize, StoreError> {
        let n = match scope {
            DeleteScope::AllYears => self.conn.execute(
                "DELETE FROM placements WHERE user_id = ? AND topic_id = ?",
                params![user_id, topic_id],
            )?,
            DeleteScope::Year(year) => self.conn.execute(
                "DELETE FROM placements WHERE user_id = ? AND topic_id = ? AND planned_year = ?",
                params![user_id, topic_id, year],
            )?,
            DeleteScope::YearExcept { year, keep } => self.conn.execute(
                "DELETE FROM placements
                 WHERE user_id = ? AND topic_id = ? AND planned_year = ? AND planned_month <> ?",
                params![user_id, topic_id, year, keep.number()],
            )?,
        };
        Ok(n)
    }

    fn set_topic_metric(
        &self,
        user_id: &str,
        topic_id: &str,
        year: i32,
        kind: MetricKind,
        value: f64,
    ) -> Result<usize, StoreError> {
        let sql = format!(
            "UPDATE placements SET {} = ?, updated_at = ?
             WHERE user_id = ? AND topic_id = ? AND planned_year = ?",
            kind.column()
        );
        let n = self
            .conn
            .execute(&sql, params![value, now_stamp(), user_id, topic_id, year])?;
        Ok(n)
    }
}
