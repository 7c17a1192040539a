//! SQLite-backed session store.
//!
//! The database lives at `~/.vigil/vigil.db` and holds the durable half of
//! the engine's state: O3 sessions (with their set-once notification flags)
//! and small key/value markers such as the weekly summary's last-sent date.
//! Alert-threshold state is deliberately NOT here — see `alerts.rs`.

use std::path::PathBuf;

use rusqlite::Connection;

pub mod sessions;
pub use sessions::{O3Session, ReportWeekSummary};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),
    #[error("Could not find home directory")]
    HomeDirNotFound,
}

pub struct SessionDb {
    conn: Connection,
}

impl SessionDb {
    /// Open (or create) the database at `~/.vigil/vigil.db`.
    pub fn open() -> Result<Self, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Self::open_at(home.join(".vigil").join("vigil.db"))
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL for better concurrent read behavior
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        Self::apply_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Apply the schema. Idempotent, safe to run every startup.
    fn apply_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS o3_sessions (
                event_id            TEXT PRIMARY KEY,
                report_email        TEXT NOT NULL,
                report_name         TEXT NOT NULL,
                start_time          TEXT NOT NULL,
                end_time            TEXT NOT NULL,
                afternoon_prep_sent INTEGER NOT NULL DEFAULT 0,
                pre_meeting_sent    INTEGER NOT NULL DEFAULT 0,
                post_meeting_sent   INTEGER NOT NULL DEFAULT 0,
                lattice_logged      INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_o3_sessions_report_start
                ON o3_sessions (report_email, start_time);

            CREATE TABLE IF NOT EXISTS markers (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
    }

    /// Read a marker value.
    pub fn get_marker(&self, key: &str) -> Result<Option<String>, DbError> {
        let mut stmt = self.conn.prepare("SELECT value FROM markers WHERE key = ?1")?;
        let mut rows = stmt.query_map([key], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(e)) => Err(DbError::Sqlite(e)),
            None => Ok(None),
        }
    }

    /// Set a marker value (insert or replace).
    pub fn set_marker(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO markers (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_applies_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = SessionDb::open_at(dir.path().join("vigil.db")).unwrap();
        // Schema exists: marker round-trip works
        assert_eq!(db.get_marker("absent").unwrap(), None);
        db.set_marker("k", "v1").unwrap();
        assert_eq!(db.get_marker("k").unwrap().as_deref(), Some("v1"));
        db.set_marker("k", "v2").unwrap();
        assert_eq!(db.get_marker("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.db");
        {
            let db = SessionDb::open_at(path.clone()).unwrap();
            db.set_marker("k", "v").unwrap();
        }
        let db = SessionDb::open_at(path).unwrap();
        assert_eq!(db.get_marker("k").unwrap().as_deref(), Some("v"));
    }
}
