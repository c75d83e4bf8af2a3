//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::store::{CreateJobRequest, JobError, JobFilter, JobStore};
use super::types::{ExportJob, ExportPhase, ExportSettings, JobState};

/// SQLite-backed job store.
///
/// The connection is serialized behind a mutex, which also makes
/// `claim_next_pending` atomic: the select and the ownership-taking update
/// happen under one lock.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Create a new SQLite job store, creating the database file and tables
    /// if needed.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = Connection::open(path).map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS export_jobs (
                id TEXT PRIMARY KEY,
                presentation_id TEXT NOT NULL,
                requested_by TEXT NOT NULL,
                language TEXT NOT NULL,
                settings TEXT NOT NULL,
                state TEXT NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 1,
                retry_of TEXT,
                cancel_requested INTEGER NOT NULL DEFAULT 0,
                available_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_requested_by ON export_jobs(requested_by);
            CREATE INDEX IF NOT EXISTS idx_jobs_presentation ON export_jobs(presentation_id);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON export_jobs(created_at);
            "#,
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_where_clause(filter: &JobFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref state) = filter.state {
            // State is stored as tagged JSON; match on its "type" field.
            conditions.push("json_extract(state, '$.type') = ?");
            params.push(Box::new(state.clone()));
        }

        if let Some(ref requested_by) = filter.requested_by {
            conditions.push("requested_by = ?");
            params.push(Box::new(requested_by.clone()));
        }

        if let Some(ref presentation_id) = filter.presentation_id {
            conditions.push("presentation_id = ?");
            params.push(Box::new(presentation_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<ExportJob> {
        let id: String = row.get(0)?;
        let presentation_id: String = row.get(1)?;
        let requested_by: String = row.get(2)?;
        let language: String = row.get(3)?;
        let settings_json: String = row.get(4)?;
        let state_json: String = row.get(5)?;
        let attempt: u32 = row.get(6)?;
        let retry_of: Option<String> = row.get(7)?;
        let cancel_requested: bool = row.get(8)?;
        let available_at_str: String = row.get(9)?;
        let created_at_str: String = row.get(10)?;
        let updated_at_str: String = row.get(11)?;

        let parse_ts = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now())
        };

        // A corrupt row must surface as an error; defaulting the state
        // would resurrect a terminal job as claimable.
        let settings: ExportSettings = serde_json::from_str(&settings_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let state: JobState = serde_json::from_str(&state_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(ExportJob {
            id,
            presentation_id,
            requested_by,
            language,
            settings,
            state,
            attempt,
            retry_of,
            cancel_requested,
            available_at: parse_ts(&available_at_str),
            created_at: parse_ts(&created_at_str),
            updated_at: parse_ts(&updated_at_str),
        })
    }

    const SELECT_COLUMNS: &'static str = "id, presentation_id, requested_by, language, settings, \
         state, attempt, retry_of, cancel_requested, available_at, created_at, updated_at";

    fn get_locked(conn: &Connection, id: &str) -> Result<Option<ExportJob>, JobError> {
        let sql = format!(
            "SELECT {} FROM export_jobs WHERE id = ?",
            Self::SELECT_COLUMNS
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| JobError::Database(e.to_string()))?;

        let mut rows = stmt
            .query_map(params![id], Self::row_to_job)
            .map_err(|e| JobError::Database(e.to_string()))?;

        match rows.next() {
            Some(row) => row
                .map(Some)
                .map_err(|e| JobError::Database(e.to_string())),
            None => Ok(None),
        }
    }

    fn write_state(
        conn: &Connection,
        id: &str,
        state: &JobState,
        cancel_requested: Option<bool>,
    ) -> Result<(), JobError> {
        let state_json =
            serde_json::to_string(state).map_err(|e| JobError::Database(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let updated = match cancel_requested {
            Some(flag) => conn
                .execute(
                    "UPDATE export_jobs SET state = ?, cancel_requested = ?, updated_at = ? WHERE id = ?",
                    params![state_json, flag, now, id],
                )
                .map_err(|e| JobError::Database(e.to_string()))?,
            None => conn
                .execute(
                    "UPDATE export_jobs SET state = ?, updated_at = ? WHERE id = ?",
                    params![state_json, now, id],
                )
                .map_err(|e| JobError::Database(e.to_string()))?,
        };

        if updated == 0 {
            return Err(JobError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Clamp progress so it never moves backwards within a job, and carry
    /// the last processing value into failed/cancelled snapshots.
    fn clamp_progress(current: &JobState, new_state: JobState) -> JobState {
        let previous = match current {
            JobState::Processing { progress, .. } => *progress,
            _ => return new_state,
        };

        match new_state {
            JobState::Processing {
                phase,
                progress,
                started_at,
                heartbeat_at,
            } => JobState::Processing {
                phase,
                progress: progress.max(previous),
                started_at,
                heartbeat_at,
            },
            JobState::Failed {
                error,
                class,
                progress,
                failed_at,
            } => JobState::Failed {
                error,
                class,
                progress: progress.max(previous),
                failed_at,
            },
            JobState::Cancelled {
                progress,
                cancelled_at,
            } => JobState::Cancelled {
                progress: progress.max(previous),
                cancelled_at,
            },
            other => other,
        }
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, request: CreateJobRequest) -> Result<ExportJob, JobError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let state = JobState::Pending;

        let state_json =
            serde_json::to_string(&state).map_err(|e| JobError::Database(e.to_string()))?;
        let settings_json = serde_json::to_string(&request.settings)
            .map_err(|e| JobError::Database(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO export_jobs (
                id, presentation_id, requested_by, language, settings, state,
                attempt, retry_of, cancel_requested, available_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            "#,
            params![
                id,
                request.presentation_id,
                request.requested_by,
                request.language,
                settings_json,
                state_json,
                request.attempt,
                request.retry_of,
                request.available_at.to_rfc3339(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(ExportJob {
            id,
            presentation_id: request.presentation_id,
            requested_by: request.requested_by,
            language: request.language,
            settings: request.settings,
            state,
            attempt: request.attempt,
            retry_of: request.retry_of,
            cancel_requested: false,
            available_at: request.available_at,
            created_at: now,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<ExportJob>, JobError> {
        let conn = self.conn.lock().unwrap();
        Self::get_locked(&conn, id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<ExportJob>, JobError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, mut params) = Self::build_where_clause(filter);
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let sql = format!(
            "SELECT {} FROM export_jobs {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            Self::SELECT_COLUMNS,
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| JobError::Database(e.to_string()))?;

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let jobs = stmt
            .query_map(param_refs.as_slice(), Self::row_to_job)
            .map_err(|e| JobError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(jobs)
    }

    fn count(&self, filter: &JobFilter) -> Result<i64, JobError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM export_jobs {}", where_clause);

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| JobError::Database(e.to_string()))?;

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        stmt.query_row(param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| JobError::Database(e.to_string()))
    }

    fn claim_next_pending(&self) -> Result<Option<ExportJob>, JobError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let sql = format!(
            "SELECT {} FROM export_jobs \
             WHERE json_extract(state, '$.type') = 'pending' AND available_at <= ? \
             ORDER BY created_at ASC LIMIT 1",
            Self::SELECT_COLUMNS
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| JobError::Database(e.to_string()))?;

        let mut rows = stmt
            .query_map(params![now.to_rfc3339()], Self::row_to_job)
            .map_err(|e| JobError::Database(e.to_string()))?;

        let Some(job) = rows.next() else {
            return Ok(None);
        };
        let mut job = job.map_err(|e| JobError::Database(e.to_string()))?;
        drop(rows);
        drop(stmt);

        let claimed = JobState::Processing {
            phase: ExportPhase::Loading,
            progress: 0,
            started_at: now,
            heartbeat_at: now,
        };
        Self::write_state(&conn, &job.id, &claimed, None)?;

        job.state = claimed;
        job.updated_at = now;
        Ok(Some(job))
    }

    fn update_state(&self, id: &str, new_state: JobState) -> Result<ExportJob, JobError> {
        let conn = self.conn.lock().unwrap();

        let current = Self::get_locked(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if current.state.is_terminal() {
            return Err(JobError::InvalidState {
                job_id: id.to_string(),
                current_state: current.state.state_type().to_string(),
                operation: "update".to_string(),
            });
        }

        let effective = Self::clamp_progress(&current.state, new_state);
        Self::write_state(&conn, id, &effective, None)?;

        Self::get_locked(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    fn heartbeat(&self, id: &str) -> Result<(), JobError> {
        let conn = self.conn.lock().unwrap();

        let current = Self::get_locked(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;

        match current.state {
            JobState::Processing {
                phase,
                progress,
                started_at,
                ..
            } => {
                let refreshed = JobState::Processing {
                    phase,
                    progress,
                    started_at,
                    heartbeat_at: Utc::now(),
                };
                Self::write_state(&conn, id, &refreshed, None)
            }
            other => Err(JobError::InvalidState {
                job_id: id.to_string(),
                current_state: other.state_type().to_string(),
                operation: "heartbeat".to_string(),
            }),
        }
    }

    fn request_cancel(&self, id: &str) -> Result<ExportJob, JobError> {
        let conn = self.conn.lock().unwrap();

        let current = Self::get_locked(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;

        match &current.state {
            JobState::Pending => {
                // Never entered processing; terminal immediately.
                let cancelled = JobState::Cancelled {
                    progress: 0,
                    cancelled_at: Utc::now(),
                };
                Self::write_state(&conn, id, &cancelled, Some(true))?;
            }
            JobState::Processing { .. } => {
                // Flag only; the owning worker tears down at its next
                // checkpoint.
                let state = current.state.clone();
                Self::write_state(&conn, id, &state, Some(true))?;
            }
            terminal => {
                return Err(JobError::InvalidState {
                    job_id: id.to_string(),
                    current_state: terminal.state_type().to_string(),
                    operation: "cancel".to_string(),
                });
            }
        }

        Self::get_locked(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExportJob>, JobError> {
        let conn = self.conn.lock().unwrap();

        let sql = format!(
            "SELECT {} FROM export_jobs \
             WHERE json_extract(state, '$.type') = 'processing' \
             AND json_extract(state, '$.heartbeat_at') < ? \
             ORDER BY created_at ASC",
            Self::SELECT_COLUMNS
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| JobError::Database(e.to_string()))?;

        let jobs = stmt
            .query_map(params![cutoff.to_rfc3339()], Self::row_to_job)
            .map_err(|e| JobError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(jobs)
    }

    fn delete(&self, id: &str) -> Result<ExportJob, JobError> {
        let conn = self.conn.lock().unwrap();

        let job = Self::get_locked(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;

        conn.execute("DELETE FROM export_jobs WHERE id = ?", params![id])
            .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(job)
    }
}
