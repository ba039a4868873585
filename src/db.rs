//! Call persistence
//!
//! One row per phone call: who called, how far the role-play got, what the
//! advisor said and the feedback they received. Sessions live in memory;
//! this is the record they leave behind.

mod schema;

pub use schema::*;

use crate::state_machine::{CallPhase, SessionSnapshot};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Call not found: {0}")]
    CallNotFound(String),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

const CALL_COLUMNS: &str = "call_sid, from_number, to_number, phase, transcript, feedback, \
                            recording_url, outcome, created_at, updated_at";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Insert a fresh call, replacing any earlier row with the same SID
    pub fn create_call(&self, call_sid: &str, from: &str, to: &str) -> DbResult<CallRecord> {
        let conn = self.conn()?;
        let now = Utc::now();
        let phase = serde_json::to_string(&CallPhase::Greeting)?;

        conn.execute(
            "INSERT OR REPLACE INTO calls (call_sid, from_number, to_number, phase, transcript, outcome, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, '[]', ?5, ?6, ?6)",
            params![call_sid, from, to, phase, CallOutcome::InProgress.as_str(), now.to_rfc3339()],
        )?;

        Ok(CallRecord {
            call_sid: call_sid.to_string(),
            from_number: from.to_string(),
            to_number: to.to_string(),
            phase: CallPhase::Greeting,
            transcript: Vec::new(),
            feedback: None,
            recording_url: None,
            outcome: CallOutcome::InProgress,
            created_at: now,
            updated_at: now,
        })
    }

    /// Persist the session's phase, transcript and feedback
    pub fn save_snapshot(&self, snapshot: &SessionSnapshot) -> DbResult<()> {
        let conn = self.conn()?;
        let phase = serde_json::to_string(&snapshot.phase)?;
        let transcript = serde_json::to_string(&snapshot.transcript)?;

        let updated = conn.execute(
            "UPDATE calls SET phase = ?1, transcript = ?2, feedback = ?3, updated_at = ?4 WHERE call_sid = ?5",
            params![
                phase,
                transcript,
                snapshot.feedback,
                snapshot.last_response_at.to_rfc3339(),
                snapshot.call_sid
            ],
        )?;

        if updated == 0 {
            return Err(DbError::CallNotFound(snapshot.call_sid.clone()));
        }
        Ok(())
    }

    pub fn set_outcome(&self, call_sid: &str, outcome: CallOutcome) -> DbResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE calls SET outcome = ?1, updated_at = ?2 WHERE call_sid = ?3",
            params![outcome.as_str(), Utc::now().to_rfc3339(), call_sid],
        )?;

        if updated == 0 {
            return Err(DbError::CallNotFound(call_sid.to_string()));
        }
        Ok(())
    }

    /// Store the URL of the full-call recording
    pub fn set_recording_url(&self, call_sid: &str, url: &str) -> DbResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE calls SET recording_url = ?1, updated_at = ?2 WHERE call_sid = ?3",
            params![url, Utc::now().to_rfc3339(), call_sid],
        )?;

        if updated == 0 {
            return Err(DbError::CallNotFound(call_sid.to_string()));
        }
        Ok(())
    }

    pub fn get_call(&self, call_sid: &str) -> DbResult<CallRecord> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE call_sid = ?1"
        ))?;

        stmt.query_row(params![call_sid], read_call)
            .optional()?
            .ok_or_else(|| DbError::CallNotFound(call_sid.to_string()))
    }

    /// Most recent calls first
    pub fn list_calls(&self, limit: usize) -> DbResult<Vec<CallRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CALL_COLUMNS} FROM calls ORDER BY created_at DESC LIMIT ?1"
        ))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let calls = stmt
            .query_map(params![limit], read_call)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(calls)
    }

    /// Mark calls left in progress by a previous process as abandoned.
    ///
    /// Returns how many rows were updated.
    pub fn abandon_in_progress(&self) -> DbResult<usize> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE calls SET outcome = ?1, updated_at = ?2 WHERE outcome = ?3",
            params![
                CallOutcome::Abandoned.as_str(),
                Utc::now().to_rfc3339(),
                CallOutcome::InProgress.as_str()
            ],
        )?;
        Ok(updated)
    }
}

fn read_call(row: &Row<'_>) -> rusqlite::Result<CallRecord> {
    let phase: String = row.get(3)?;
    let transcript: String = row.get(4)?;
    let outcome: String = row.get(7)?;

    Ok(CallRecord {
        call_sid: row.get(0)?,
        from_number: row.get(1)?,
        to_number: row.get(2)?,
        phase: serde_json::from_str(&phase).unwrap_or_default(),
        transcript: serde_json::from_str(&transcript).unwrap_or_default(),
        feedback: row.get(5)?,
        recording_url: row.get(6)?,
        outcome: outcome.parse().unwrap_or_default(),
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        updated_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
