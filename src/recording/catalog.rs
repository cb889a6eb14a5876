//! SQLite index of recording sessions
//!
//! Optional. Rows are written when a session starts and updated when it is
//! finalized, so runs that crash mid-session still show up as `recording`.
//! Catalog failures are logged and never interrupt recording.

use bevy::log::warn;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::session::{FinalizeReport, RecordingSession};

/// One cataloged session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub started_at: String,
    pub stopped_at: Option<String>,
    pub directory: String,
    pub archive_path: Option<String>,
    /// `recording`, `archived` or `failed`
    pub status: String,
    pub frames: i64,
    pub snapshots: i64,
    pub screenshots: i64,
    pub write_failures: i64,
    pub error: Option<String>,
}

pub struct RecordingCatalog {
    conn: Mutex<Connection>,
}

impl RecordingCatalog {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;

        // WAL so `inspect` can read while a run is writing
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// A panic elsewhere while holding the lock leaves the connection usable
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("Catalog: connection lock was poisoned, continuing");
            PoisonError::into_inner(poisoned)
        })
    }

    pub fn session_started(&self, session: &RecordingSession) {
        let conn = self.conn();
        let result = conn.execute(
            r#"INSERT OR REPLACE INTO recordings
               (id, name, started_at, directory, archive_path, status)
               VALUES (?1, ?2, ?3, ?4, ?5, 'recording')"#,
            params![
                session.id().simple().to_string(),
                session.name(),
                Utc::now().to_rfc3339(),
                session.directory().to_string_lossy().to_string(),
                session.archive_path().to_string_lossy().to_string(),
            ],
        );
        if let Err(e) = result {
            warn!("Catalog: failed to add session {}: {}", session.id().simple(), e);
        }
    }

    pub fn session_finished(&self, report: &FinalizeReport) {
        let conn = self.conn();
        let (status, archive_path, error) = match &report.archive {
            Ok(path) => ("archived", Some(path.to_string_lossy().to_string()), None),
            Err(e) => ("failed", None, Some(e.clone())),
        };
        let result = conn.execute(
            r#"UPDATE recordings
               SET stopped_at = ?2, status = ?3, archive_path = ?4, frames = ?5,
                   snapshots = ?6, screenshots = ?7, write_failures = ?8, error = ?9
               WHERE id = ?1"#,
            params![
                report.session_id.simple().to_string(),
                Utc::now().to_rfc3339(),
                status,
                archive_path,
                report.stats.frames_processed as i64,
                report.stats.snapshots_written as i64,
                report.stats.screenshots_written as i64,
                report.stats.write_failures as i64,
                error,
            ],
        );
        if let Err(e) = result {
            warn!(
                "Catalog: failed to update session {}: {}",
                report.session_id.simple(),
                e
            );
        }
    }

    /// All sessions, newest first
    pub fn list(&self) -> Result<Vec<CatalogEntry>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM recordings ORDER BY started_at DESC, rowid DESC",
            COLUMNS
        ))?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<CatalogEntry>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM recordings WHERE id = ?1", COLUMNS),
            params![id.simple().to_string()],
            entry_from_row,
        )
        .optional()
    }
}

const COLUMNS: &str = "id, name, started_at, stopped_at, directory, archive_path, status, \
                       frames, snapshots, screenshots, write_failures, error";

fn entry_from_row(row: &Row<'_>) -> Result<CatalogEntry, rusqlite::Error> {
    Ok(CatalogEntry {
        id: row.get(0)?,
        name: row.get(1)?,
        started_at: row.get(2)?,
        stopped_at: row.get(3)?,
        directory: row.get(4)?,
        archive_path: row.get(5)?,
        status: row.get(6)?,
        frames: row.get(7)?,
        snapshots: row.get(8)?,
        screenshots: row.get(9)?,
        write_failures: row.get(10)?,
        error: row.get(11)?,
    })
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS recordings (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            started_at TEXT NOT NULL,
            stopped_at TEXT,
            directory TEXT NOT NULL,
            archive_path TEXT,
            status TEXT NOT NULL,
            frames INTEGER NOT NULL DEFAULT 0,
            snapshots INTEGER NOT NULL DEFAULT 0,
            screenshots INTEGER NOT NULL DEFAULT 0,
            write_failures INTEGER NOT NULL DEFAULT 0,
            error TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_recordings_started ON recordings(started_at);
        "#,
    )
}
