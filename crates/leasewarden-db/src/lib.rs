//! # LeaseWarden DB
//!
//! SQLite-backed datastore shared by every lifecycle job: leased resources,
//! queued notifications, the append-only job log, run summaries and a small
//! settings table.
//!
//! All timestamps are stored as RFC 3339 UTC strings with millisecond
//! precision, so text ordering equals time ordering.

mod logs;
mod notifications;
mod resources;

pub use logs::NewLogEntry;
pub use resources::ResourceFilter;

use chrono::{DateTime, SecondsFormat, Utc};
use leasewarden_core::error::{LeaseError, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Shared datastore handle.
pub struct LeaseDb {
    conn: Mutex<Connection>,
}

impl LeaseDb {
    /// Open or create the database. `:memory:` gives a private in-memory store.
    pub fn open(path: &Path) -> Result<Self> {
        if path != Path::new(":memory:") {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| LeaseError::Database(format!("DB open error: {e}")))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| LeaseError::Database(format!("DB pragma error: {e}")))?;

        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database, mostly for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- Leased compute resources
            CREATE TABLE IF NOT EXISTS resources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                owner_email TEXT NOT NULL,
                external_id TEXT,
                status TEXT NOT NULL,           -- ACTIVE, EXPIRED, DELETED, ...
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_resources_status_expiry
                ON resources(status, expires_at);

            -- Outbound reminder mails
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                recipient TEXT NOT NULL,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',  -- PENDING, SENT, FAILED, EXHAUSTED
                retries INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TEXT NOT NULL,
                sent_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_notifications_dedup
                ON notifications(resource_id, kind);
            CREATE INDEX IF NOT EXISTS idx_notifications_queue
                ON notifications(status, retries, created_at);

            -- Append-only job audit log
            CREATE TABLE IF NOT EXISTS job_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_type TEXT NOT NULL,
                job_run TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                details TEXT,                   -- JSON
                resource_id TEXT,
                user_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_job_logs_run ON job_logs(job_run, id);

            -- One row per job execution
            CREATE TABLE IF NOT EXISTS job_runs (
                run_id TEXT PRIMARY KEY,
                job_type TEXT NOT NULL,
                status TEXT NOT NULL,           -- running, completed, failed, cancelled
                started_at TEXT NOT NULL,
                finished_at TEXT,
                processed INTEGER NOT NULL DEFAULT 0,
                total INTEGER NOT NULL DEFAULT 0,
                succeeded INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            );

            -- Key/value settings (cached version, ...)
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
         ",
            )
            .map_err(|e| LeaseError::Database(format!("Migration: {e}")))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LeaseError::Database("connection lock poisoned".into()))
    }

    // ── Settings ────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        match conn.query_row(
            "SELECT value FROM settings WHERE key=?1",
            [key],
            |row| row.get::<_, String>(0),
        ) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LeaseError::Database(format!("Get setting: {e}"))),
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
                rusqlite::params![key, value, ts(Utc::now())],
            )
            .map_err(|e| LeaseError::Database(format!("Set setting: {e}")))?;
        Ok(())
    }
}

/// Canonical timestamp encoding.
pub(crate) fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decode a stored timestamp; `idx` is the column for error reporting.
pub(crate) fn parse_ts(s: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Decode a stored enum name.
/// `?, ?, ?` for an `IN (...)` list of `n` values.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub(crate) fn parse_enum<T>(
    s: &str,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown value '{s}'").into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_migrate_twice() {
        let dir = std::env::temp_dir().join("leasewarden-db-migrate-test");
        std::fs::create_dir_all(&dir).ok();
        let path = dir.join("test.db");
        LeaseDb::open(&path).unwrap();
        // Re-opening an existing file must not fail on CREATE
        let db = LeaseDb::open(&path).unwrap();
        assert!(db.get_setting("missing").unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_open_creates_missing_directories() {
        let root = std::env::temp_dir().join(format!("leasewarden-db-dirs-{}", std::process::id()));
        std::fs::remove_dir_all(&root).ok();
        let path = root.join("nested").join("leasewarden.db");

        let db = LeaseDb::open(&path).unwrap();
        db.set_setting("k", "v").unwrap();
        assert!(path.exists());
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_settings_upsert() {
        let db = LeaseDb::open_in_memory().unwrap();
        db.set_setting("cached_version", "2.0.9").unwrap();
        db.set_setting("cached_version", "2.0.10").unwrap();
        assert_eq!(db.get_setting("cached_version").unwrap().as_deref(), Some("2.0.10"));
    }

    #[test]
    fn test_timestamp_text_order_matches_time_order() {
        let a = Utc::now();
        let b = a + chrono::Duration::milliseconds(5);
        assert!(ts(a) < ts(b));
        assert_eq!(parse_ts(&ts(a), 0).unwrap().timestamp_millis(), a.timestamp_millis());
    }
}
