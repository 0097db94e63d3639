//! Job audit log and run summaries.

use chrono::{DateTime, Utc};
use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::types::{LogEntry, LogLevel, RunStatus, RunSummary};

use crate::{LeaseDb, parse_enum, parse_ts, ts};

/// An audit entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewLogEntry<'a> {
    pub job_type: &'a str,
    pub job_run: &'a str,
    pub level: LogLevel,
    pub message: &'a str,
    pub details: Option<&'a serde_json::Value>,
    pub resource_id: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

fn row_to_log(row: &rusqlite::Row) -> rusqlite::Result<LogEntry> {
    let level: String = row.get(3)?;
    let details: Option<String> = row.get(5)?;
    let created_at: String = row.get(8)?;
    Ok(LogEntry {
        id: row.get(0)?,
        job_type: row.get(1)?,
        job_run: row.get(2)?,
        level: parse_enum(&level, 3, LogLevel::parse)?,
        message: row.get(4)?,
        details: details.and_then(|d| serde_json::from_str(&d).ok()),
        resource_id: row.get(6)?,
        user_id: row.get(7)?,
        created_at: parse_ts(&created_at, 8)?,
    })
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RunSummary> {
    let status: String = row.get(2)?;
    let started_at: String = row.get(3)?;
    let finished_at: Option<String> = row.get(4)?;
    Ok(RunSummary {
        run_id: row.get(0)?,
        job_type: row.get(1)?,
        status: parse_enum(&status, 2, RunStatus::parse)?,
        started_at: parse_ts(&started_at, 3)?,
        finished_at: finished_at.as_deref().map(|s| parse_ts(s, 4)).transpose()?,
        processed: row.get::<_, i64>(5)? as u64,
        total: row.get::<_, i64>(6)? as u64,
        succeeded: row.get::<_, i64>(7)? as u64,
        failed: row.get::<_, i64>(8)? as u64,
        last_error: row.get(9)?,
    })
}

const RUN_SELECT: &str = "SELECT run_id, job_type, status, started_at, finished_at, processed, total, succeeded, failed, last_error FROM job_runs";

impl LeaseDb {
    // ── Audit Log ────────────────────────────────────

    /// Append one audit entry.
    pub fn append_log(&self, entry: &NewLogEntry<'_>) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO job_logs (job_type, job_run, level, message, details, resource_id, user_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                entry.job_type,
                entry.job_run,
                entry.level.as_str(),
                entry.message,
                entry.details.map(|d| d.to_string()),
                entry.resource_id,
                entry.user_id,
                ts(entry.created_at),
            ],
        )
        .map_err(|e| LeaseError::Database(format!("Log entry: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    /// Full timeline of one execution, in write order.
    pub fn logs_for_run(&self, job_run: &str) -> Result<Vec<LogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, job_type, job_run, level, message, details, resource_id, user_id, created_at
                 FROM job_logs WHERE job_run = ?1 ORDER BY id ASC",
            )
            .map_err(|e| LeaseError::Database(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map([job_run], row_to_log)
            .map_err(|e| LeaseError::Database(format!("Query: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| LeaseError::Database(format!("Read log: {e}")))
    }

    // ── Runs ────────────────────────────────────

    /// Record the start of an execution.
    pub fn start_run(&self, run_id: &str, job_type: &str, started_at: DateTime<Utc>) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO job_runs (run_id, job_type, status, started_at) VALUES (?1, ?2, 'running', ?3)",
                rusqlite::params![run_id, job_type, ts(started_at)],
            )
            .map_err(|e| LeaseError::Database(format!("Start run: {e}")))?;
        Ok(())
    }

    /// Store the final counters and status of an execution.
    pub fn finish_run(&self, summary: &RunSummary) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE job_runs SET status = ?1, finished_at = ?2, processed = ?3, total = ?4,
                        succeeded = ?5, failed = ?6, last_error = ?7
                 WHERE run_id = ?8",
                rusqlite::params![
                    summary.status.as_str(),
                    summary.finished_at.map(ts),
                    summary.processed as i64,
                    summary.total as i64,
                    summary.succeeded as i64,
                    summary.failed as i64,
                    summary.last_error,
                    summary.run_id,
                ],
            )
            .map_err(|e| LeaseError::Database(format!("Finish run: {e}")))?;
        Ok(())
    }

    /// Most recent executions first.
    pub fn recent_runs(&self, job_type: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "{RUN_SELECT} WHERE (?1 IS NULL OR job_type = ?1) ORDER BY started_at DESC, run_id DESC LIMIT ?2"
            ))
            .map_err(|e| LeaseError::Database(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map(rusqlite::params![job_type, limit as i64], row_to_run)
            .map_err(|e| LeaseError::Database(format!("Query: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| LeaseError::Database(format!("Read run: {e}")))
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunSummary>> {
        let conn = self.conn()?;
        match conn.query_row(&format!("{RUN_SELECT} WHERE run_id = ?1"), [run_id], row_to_run) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LeaseError::Database(format!("Get run: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry<'a>(run: &'a str, level: LogLevel, message: &'a str) -> NewLogEntry<'a> {
        NewLogEntry {
            job_type: "expire",
            job_run: run,
            level,
            message,
            details: None,
            resource_id: None,
            user_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_run_timeline_is_isolated_and_ordered() {
        let db = LeaseDb::open_in_memory().unwrap();
        let details = serde_json::json!({"processed": 3});
        db.append_log(&entry("run-a", LogLevel::Info, "start")).unwrap();
        db.append_log(&entry("run-b", LogLevel::Info, "other")).unwrap();
        db.append_log(&NewLogEntry {
            details: Some(&details),
            resource_id: Some("r1"),
            ..entry("run-a", LogLevel::Warn, "stop")
        })
        .unwrap();

        let timeline = db.logs_for_run("run-a").unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].message, "start");
        assert_eq!(timeline[1].level, LogLevel::Warn);
        assert_eq!(timeline[1].details.as_ref().unwrap()["processed"], 3);
        assert_eq!(timeline[1].resource_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_run_lifecycle() {
        let db = LeaseDb::open_in_memory().unwrap();
        let started = Utc::now();
        db.start_run("expire-1-abc", "expire", started).unwrap();
        let running = db.get_run("expire-1-abc").unwrap().unwrap();
        assert_eq!(running.status, RunStatus::Running);

        db.finish_run(&RunSummary {
            status: RunStatus::Failed,
            finished_at: Some(Utc::now()),
            processed: 3,
            total: 10,
            succeeded: 2,
            failed: 1,
            last_error: Some("scan failed".into()),
            ..running
        })
        .unwrap();

        let runs = db.recent_runs(Some("expire"), 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].processed, 3);
        assert_eq!(runs[0].last_error.as_deref(), Some("scan failed"));
        assert!(db.recent_runs(Some("delete"), 10).unwrap().is_empty());
        assert_eq!(db.recent_runs(None, 10).unwrap().len(), 1);
    }
}
