//! Notification queue: dedup-guarded creation and delivery bookkeeping.

use chrono::Utc;
use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::types::{
    NewNotification, NotificationRecord, NotificationStatus, ReminderKind,
};

use rusqlite::params_from_iter;
use rusqlite::types::Value;

use crate::{LeaseDb, parse_enum, parse_ts, placeholders, ts};

const NOTIFICATION_SELECT: &str = "SELECT id, resource_id, kind, recipient, subject, body, status, retries, last_error, created_at, sent_at FROM notifications";

fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<NotificationRecord> {
    let kind: String = row.get(2)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(9)?;
    let sent_at: Option<String> = row.get(10)?;
    Ok(NotificationRecord {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        kind: parse_enum(&kind, 2, ReminderKind::parse)?,
        recipient: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        status: parse_enum(&status, 6, NotificationStatus::parse)?,
        retries: row.get(7)?,
        last_error: row.get(8)?,
        created_at: parse_ts(&created_at, 9)?,
        sent_at: sent_at.as_deref().map(|s| parse_ts(s, 10)).transpose()?,
    })
}

impl LeaseDb {
    // ── Notifications ────────────────────────────────────

    /// Enqueue a notification unless one with the same (resource, kind)
    /// already exists. Returns the new row id, or `None` on a duplicate.
    pub fn insert_notification(&self, n: &NewNotification) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO notifications (resource_id, kind, recipient, subject, body, status, retries, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING', 0, ?6)",
                rusqlite::params![
                    n.resource_id,
                    n.kind.as_str(),
                    n.recipient,
                    n.subject,
                    n.body,
                    ts(Utc::now()),
                ],
            )
            .map_err(|e| LeaseError::Database(format!("Insert notification: {e}")))?;
        Ok((inserted == 1).then(|| conn.last_insert_rowid()))
    }

    /// Whether a notification of `kind` exists for the resource.
    pub fn notification_exists(&self, resource_id: &str, kind: ReminderKind) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM notifications WHERE resource_id = ?1 AND kind = ?2",
                rusqlite::params![resource_id, kind.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| LeaseError::Database(format!("Notification exists: {e}")))?;
        Ok(count > 0)
    }

    pub fn get_notification(&self, id: i64) -> Result<Option<NotificationRecord>> {
        let conn = self.conn()?;
        match conn.query_row(&format!("{NOTIFICATION_SELECT} WHERE id = ?1"), [id], row_to_notification) {
            Ok(n) => Ok(Some(n)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LeaseError::Database(format!("Get notification: {e}"))),
        }
    }

    /// Oldest-first page of notifications still eligible for delivery,
    /// leaving out the ids in `exclude`.
    pub fn fetch_dispatchable(
        &self,
        max_retries: u32,
        exclude: &[i64],
        limit: usize,
    ) -> Result<Vec<NotificationRecord>> {
        let mut sql = format!("{NOTIFICATION_SELECT} WHERE status IN ('PENDING', 'FAILED') AND retries < ?");
        let mut args: Vec<Value> = vec![Value::Integer(max_retries.into())];
        if !exclude.is_empty() {
            sql.push_str(&format!(" AND id NOT IN ({})", placeholders(exclude.len())));
            args.extend(exclude.iter().map(|id| Value::Integer(*id)));
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC LIMIT ?");
        args.push(Value::Integer(limit as i64));

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LeaseError::Database(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map(params_from_iter(args), row_to_notification)
            .map_err(|e| LeaseError::Database(format!("Query: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| LeaseError::Database(format!("Read notification: {e}")))
    }

    pub fn count_dispatchable(&self, max_retries: u32) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM notifications WHERE status IN ('PENDING', 'FAILED') AND retries < ?1",
                [max_retries],
                |row| row.get(0),
            )
            .map_err(|e| LeaseError::Database(format!("Count notifications: {e}")))?;
        Ok(count as u64)
    }

    /// Mark notification as sent.
    pub fn mark_notification_sent(&self, id: i64) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE notifications SET status = 'SENT', sent_at = ?1, last_error = NULL WHERE id = ?2",
                rusqlite::params![ts(Utc::now()), id],
            )
            .map_err(|e| LeaseError::Database(format!("Mark sent: {e}")))?;
        Ok(())
    }

    /// Charge one delivery attempt against the retry budget before the
    /// mail goes out. Returns false when the row is no longer eligible.
    ///
    /// Counting up front keeps the total number of sends bounded by
    /// `max_retries` even if the outcome of a send can't be recorded.
    pub fn claim_send_attempt(&self, id: i64, max_retries: u32) -> Result<bool> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE notifications SET retries = retries + 1
                 WHERE id = ?1 AND status IN ('PENDING', 'FAILED') AND retries < ?2",
                rusqlite::params![id, max_retries],
            )
            .map_err(|e| LeaseError::Database(format!("Claim attempt: {e}")))?;
        Ok(changed == 1)
    }

    /// Record why a claimed attempt failed. The row becomes `EXHAUSTED`
    /// once its claimed attempts reach `max_retries`, otherwise `FAILED`.
    pub fn record_send_failure(&self, id: i64, error: &str, max_retries: u32) -> Result<NotificationStatus> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE notifications
             SET last_error = ?1,
                 status = CASE WHEN retries >= ?2 THEN 'EXHAUSTED' ELSE 'FAILED' END
             WHERE id = ?3",
            rusqlite::params![error, max_retries, id],
        )
        .map_err(|e| LeaseError::Database(format!("Record failure: {e}")))?;
        let status: String = conn
            .query_row("SELECT status FROM notifications WHERE id = ?1", [id], |row| row.get(0))
            .map_err(|e| LeaseError::Database(format!("Read status: {e}")))?;
        NotificationStatus::parse(&status)
            .ok_or_else(|| LeaseError::Database(format!("unknown notification status '{status}'")))
    }
}
