//! Audit logger: every entry goes to the job_logs table and to tracing.
//!
//! Writing the audit trail must never take a job down: when the sink
//! rejects an entry the failure is reported through `tracing::error!`
//! and the caller carries on.

use std::sync::Arc;

use chrono::Utc;
use leasewarden_core::error::Result;
use leasewarden_core::types::{LogLevel, ManagedResource};
use leasewarden_db::{LeaseDb, NewLogEntry};
use serde_json::Value;

/// Where audit entries are persisted.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &NewLogEntry<'_>) -> Result<i64>;
}

impl AuditSink for LeaseDb {
    fn append(&self, entry: &NewLogEntry<'_>) -> Result<i64> {
        self.append_log(entry)
    }
}

/// Optional subject of an entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct Subject<'a> {
    pub resource_id: Option<&'a str>,
    pub user_id: Option<&'a str>,
}

impl<'a> Subject<'a> {
    pub fn resource(r: &'a ManagedResource) -> Self {
        Self {
            resource_id: Some(&r.id),
            user_id: Some(&r.owner_id),
        }
    }
}

/// Shared front door to the audit trail.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record one entry. Never fails.
    pub fn log(
        &self,
        job_type: &str,
        job_run: &str,
        level: LogLevel,
        message: &str,
        details: Option<&Value>,
        subject: Subject<'_>,
    ) {
        let resource = subject.resource_id.unwrap_or("-");
        let details_text = details.map(|d| d.to_string()).unwrap_or_default();
        match level {
            LogLevel::Info => {
                tracing::info!(job = job_type, run = job_run, resource, details = %details_text, "{message}")
            }
            LogLevel::Warn => {
                tracing::warn!(job = job_type, run = job_run, resource, details = %details_text, "{message}")
            }
            LogLevel::Error | LogLevel::Fatal => {
                tracing::error!(job = job_type, run = job_run, resource, level = level.as_str(), details = %details_text, "{message}")
            }
        }

        let entry = NewLogEntry {
            job_type,
            job_run,
            level,
            message,
            details,
            resource_id: subject.resource_id,
            user_id: subject.user_id,
            created_at: Utc::now(),
        };
        if let Err(e) = self.sink.append(&entry) {
            tracing::error!(
                job = job_type,
                run = job_run,
                "⚠️ Audit entry not persisted ({e}): [{}] {message}",
                level.as_str()
            );
        }
    }

    /// Logger bound to one execution.
    pub fn for_run(&self, job_type: &'static str, run_id: &str) -> JobLogger {
        JobLogger {
            audit: self.clone(),
            job_type,
            run_id: run_id.to_string(),
        }
    }
}

/// Audit logger scoped to a single job run.
#[derive(Clone)]
pub struct JobLogger {
    audit: AuditLogger,
    job_type: &'static str,
    run_id: String,
}

impl JobLogger {
    pub fn log(&self, level: LogLevel, message: &str, details: Option<Value>, subject: Subject<'_>) {
        self.audit.log(
            self.job_type,
            &self.run_id,
            level,
            message,
            details.as_ref(),
            subject,
        );
    }

    pub fn info(&self, message: &str, details: Option<Value>) {
        self.log(LogLevel::Info, message, details, Subject::default());
    }

    pub fn warn(&self, message: &str, details: Option<Value>) {
        self.log(LogLevel::Warn, message, details, Subject::default());
    }

    pub fn fatal(&self, message: &str, details: Option<Value>) {
        self.log(LogLevel::Fatal, message, details, Subject::default());
    }

    /// Entry about a specific resource (carries resource and owner ids).
    pub fn resource(&self, level: LogLevel, r: &ManagedResource, message: &str, details: Value) {
        self.log(level, message, Some(details), Subject::resource(r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leasewarden_core::error::LeaseError;

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn append(&self, _entry: &NewLogEntry<'_>) -> Result<i64> {
            Err(LeaseError::database("disk I/O error"))
        }
    }

    #[test]
    fn test_entries_persisted_with_subject() {
        let db = Arc::new(LeaseDb::open_in_memory().unwrap());
        let audit = AuditLogger::new(db.clone());
        let log = audit.for_run("expire", "expire-1-abc");
        let r = ManagedResource::new("srv", "user-9", "a@example.com", Utc::now());

        log.info("job started", None);
        log.resource(LogLevel::Warn, &r, "skipped", serde_json::json!({"reason": "moved"}));

        let entries = db.logs_for_run("expire-1-abc").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].job_type, "expire");
        assert_eq!(entries[1].level, LogLevel::Warn);
        assert_eq!(entries[1].resource_id.as_deref(), Some(r.id.as_str()));
        assert_eq!(entries[1].user_id.as_deref(), Some("user-9"));
        assert_eq!(entries[1].details.as_ref().unwrap()["reason"], "moved");
    }

    #[test]
    fn test_sink_failure_does_not_propagate() {
        let audit = AuditLogger::new(Arc::new(BrokenSink));
        let log = audit.for_run("delete", "delete-1-abc");
        // Would panic or return an error if the failure escaped.
        log.fatal("job aborted", Some(serde_json::json!({"error": "boom"})));
        log.info("still alive", None);
    }
}
