//! Counters of one job run.

use chrono::{DateTime, Utc};
use leasewarden_core::types::{RunStatus, RunSummary};

use crate::kind::JobKind;
use crate::run_id::RunId;

/// What happened to the items of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ScanStats {
    /// Items handled so far (successes, skips and failures).
    pub processed: u64,
    /// Items that qualified when the run started.
    pub total: u64,
    pub succeeded: u64,
    /// Left untouched for a benign reason (e.g. status moved under us).
    pub skipped: u64,
    pub failed: u64,
    /// Size of every batch the scan processed, in order.
    pub batches: Vec<usize>,
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RunReport {
    pub kind: JobKind,
    pub run_id: RunId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: ScanStats,
    pub error: Option<String>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.to_string(),
            job_type: self.kind.name().to_string(),
            status: self.status,
            started_at: self.started_at,
            finished_at: Some(self.finished_at),
            processed: self.stats.processed,
            total: self.stats.total,
            succeeded: self.stats.succeeded,
            failed: self.stats.failed,
            last_error: self.error.clone(),
        }
    }
}
