//! Collaborators shared by all jobs, and the per-run context.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use leasewarden_core::config::LeaseConfig;
use leasewarden_core::traits::{ControlPlane, MailTransport, SideChannel, TemplateRenderer, VersionSource};
use leasewarden_db::LeaseDb;

use crate::audit::JobLogger;
use crate::control::JobControl;
use crate::kind::JobKind;
use crate::run_id::RunId;
use crate::stats::ScanStats;

/// Tunables the jobs read on every run.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub batch_size: usize,
    pub retention_days: i64,
    pub max_retries: u32,
    /// Pause after every dispatch attempt.
    pub throttle: Duration,
    /// Count a 404 on delete as success instead of a failure.
    pub treat_missing_as_deleted: bool,
    /// Branch named in version alerts.
    pub branch: Option<String>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            batch_size: 20,
            retention_days: 7,
            max_retries: 4,
            throttle: Duration::from_millis(1000),
            treat_missing_as_deleted: false,
            branch: None,
        }
    }
}

impl JobSettings {
    pub fn from_config(config: &LeaseConfig) -> Self {
        Self {
            batch_size: config.jobs.batch_size.max(1),
            retention_days: config.jobs.retention_days,
            max_retries: config.dispatcher.max_retries.max(1),
            throttle: Duration::from_millis(config.dispatcher.throttle_ms),
            treat_missing_as_deleted: config.control_plane.treat_missing_as_deleted,
            branch: config.version.branch.clone(),
        }
    }
}

/// Everything a job talks to.
#[derive(Clone)]
pub struct JobDeps {
    pub db: Arc<LeaseDb>,
    pub control_plane: Arc<dyn ControlPlane>,
    pub mail: Arc<dyn MailTransport>,
    pub templates: Arc<dyn TemplateRenderer>,
    pub side_channel: Option<Arc<dyn SideChannel>>,
    pub version_source: Option<Arc<dyn VersionSource>>,
    pub settings: JobSettings,
}

/// State of one execution: identity, clock, logger, control and counters.
pub struct JobContext {
    pub kind: JobKind,
    pub run_id: RunId,
    /// Reference time for every predicate of the run.
    pub now: DateTime<Utc>,
    pub log: JobLogger,
    control: JobControl,
    stats: Mutex<ScanStats>,
}

impl JobContext {
    pub fn new(kind: JobKind, run_id: RunId, now: DateTime<Utc>, log: JobLogger, control: JobControl) -> Self {
        Self {
            kind,
            run_id,
            now,
            log,
            control,
            stats: Mutex::new(ScanStats::default()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    pub fn control(&self) -> &JobControl {
        &self.control
    }

    fn stats_mut(&self) -> MutexGuard<'_, ScanStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stats(&self) -> ScanStats {
        self.stats_mut().clone()
    }

    pub fn add_total(&self, n: u64) {
        self.stats_mut().total += n;
    }

    pub fn record_batch(&self, size: usize) {
        self.stats_mut().batches.push(size);
    }

    /// Count one handled item and report progress.
    pub fn record_item(&self, outcome: ItemResult) {
        let (processed, total) = {
            let mut s = self.stats_mut();
            s.processed += 1;
            match outcome {
                ItemResult::Succeeded => s.succeeded += 1,
                ItemResult::Skipped => s.skipped += 1,
                ItemResult::Failed => s.failed += 1,
            }
            // A generator may see rows that appeared after the count.
            if s.processed > s.total {
                s.total = s.processed;
            }
            (s.processed, s.total)
        };
        self.control.progress(processed, total);
    }
}

/// How one item ended, for the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemResult {
    Succeeded,
    Skipped,
    Failed,
}
