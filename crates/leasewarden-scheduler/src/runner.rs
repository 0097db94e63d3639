//! Job runner: starts executions, enforces one run per job at a time,
//! and writes the terminal audit entry and run summary of every run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::types::{ReminderFamily, RunStatus, RunSummary};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::audit::AuditLogger;
use crate::context::{JobContext, JobDeps};
use crate::control::{JobControl, JobEvent, JobHandle};
use crate::kind::JobKind;
use crate::run_id::RunId;
use crate::stats::{RunReport, ScanStats};
use crate::{dispatcher, handlers, reminders, version};

/// Answer to a synchronous trigger, shaped for an admin surface.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TriggerResult {
    pub success: bool,
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn execute(deps: &JobDeps, ctx: &JobContext) -> Result<ScanStats> {
    match ctx.kind {
        JobKind::Expire => handlers::expire::run(deps, ctx).await,
        JobKind::Delete => handlers::delete::run(deps, ctx).await,
        JobKind::ExpiryReminders => reminders::run(deps, ctx, ReminderFamily::Expiry).await,
        JobKind::DeletionReminders => reminders::run(deps, ctx, ReminderFamily::Deletion).await,
        JobKind::DispatchNotifications => dispatcher::run(deps, ctx).await,
        JobKind::VersionCheck => version::run(deps, ctx).await,
    }
}

/// Removes a job from the running set when its task ends, even on panic.
struct RunningGuard {
    running: Arc<Mutex<HashMap<JobKind, CancellationToken>>>,
    kind: JobKind,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        running.remove(&self.kind);
    }
}

/// Entry point for every job execution, scheduled or manual.
#[derive(Clone)]
pub struct JobRunner {
    deps: Arc<JobDeps>,
    audit: AuditLogger,
    running: Arc<Mutex<HashMap<JobKind, CancellationToken>>>,
}

impl JobRunner {
    pub fn new(deps: Arc<JobDeps>) -> Self {
        let audit = AuditLogger::new(deps.db.clone());
        Self::with_audit(deps, audit)
    }

    pub fn with_audit(deps: Arc<JobDeps>, audit: AuditLogger) -> Self {
        Self {
            deps,
            audit,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn deps(&self) -> &JobDeps {
        &self.deps
    }

    pub fn is_running(&self, kind: JobKind) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&kind)
    }

    /// Ask a running job to stop. Returns false if it was not running.
    pub fn stop(&self, kind: JobKind) -> bool {
        let running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        match running.get(&kind) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        for token in running.values() {
            token.cancel();
        }
    }

    fn acquire(&self, kind: JobKind, cancel: &CancellationToken) -> Result<RunningGuard> {
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        if running.contains_key(&kind) {
            return Err(LeaseError::AlreadyRunning(kind.name().to_string()));
        }
        running.insert(kind, cancel.clone());
        Ok(RunningGuard {
            running: self.running.clone(),
            kind,
        })
    }

    /// Start a run in the background.
    pub fn start(&self, kind: JobKind) -> Result<JobHandle> {
        let (control, cancel, events) = JobControl::channel();
        let guard = self.acquire(kind, &cancel)?;
        let started_at = Utc::now();
        let run_id = RunId::at(kind.name(), started_at);
        let ctx = JobContext::new(
            kind,
            run_id.clone(),
            started_at,
            self.audit.for_run(kind.name(), run_id.as_str()),
            control,
        );

        let deps = self.deps.clone();
        let join = tokio::spawn(async move {
            let _guard = guard;
            Ok(supervise(&deps, ctx).await)
        });
        Ok(JobHandle::new(kind, run_id, cancel, events, join))
    }

    /// Run to completion and report the outcome.
    pub async fn trigger(&self, kind: JobKind) -> TriggerResult {
        match self.start(kind) {
            Ok(handle) => {
                let run_id = handle.run_id.to_string();
                match handle.wait().await {
                    Ok(report) => TriggerResult {
                        success: report.status == RunStatus::Completed,
                        run_id: Some(run_id),
                        error: report.error.clone(),
                        result: Some(report.stats),
                    },
                    Err(e) => TriggerResult {
                        success: false,
                        run_id: Some(run_id),
                        result: None,
                        error: Some(e.to_string()),
                    },
                }
            }
            Err(e) => TriggerResult {
                success: false,
                run_id: None,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Most recent runs, newest first.
    pub fn recent_runs(&self, kind: Option<JobKind>, limit: usize) -> Result<Vec<RunSummary>> {
        self.deps.db.recent_runs(kind.map(|k| k.name()), limit)
    }
}

/// Drive one run and record how it ended.
async fn supervise(deps: &JobDeps, ctx: JobContext) -> RunReport {
    if let Err(e) = deps.db.start_run(ctx.run_id.as_str(), ctx.kind.name(), ctx.now) {
        tracing::warn!("⚠️ Could not record start of {}: {e}", ctx.run_id);
    }
    ctx.log.info("Job started", Some(json!({ "job": ctx.kind.name() })));
    tracing::info!("▶️ Job {} started ({})", ctx.kind, ctx.run_id);

    let result = execute(deps, &ctx).await;
    let stats = ctx.stats();
    let counters = json!({
        "processed": stats.processed,
        "total": stats.total,
        "succeeded": stats.succeeded,
        "skipped": stats.skipped,
        "failed": stats.failed,
        "batches": stats.batches,
    });

    let (status, error) = match result {
        Ok(_) => {
            ctx.log.info("Job completed", Some(counters));
            ctx.control().emit(JobEvent::Completed {
                processed: stats.processed,
                total: stats.total,
            });
            (RunStatus::Completed, None)
        }
        Err(e) if e.is_cancelled() => {
            ctx.log.warn("Job cancelled", Some(counters));
            ctx.control().emit(JobEvent::Failed {
                error: e.to_string(),
                processed: stats.processed,
                total: stats.total,
            });
            (RunStatus::Cancelled, Some(e.to_string()))
        }
        Err(e) => {
            let mut details = counters;
            details["error"] = json!(e.to_string());
            ctx.log.fatal("Job aborted", Some(details));
            ctx.control().emit(JobEvent::Failed {
                error: e.to_string(),
                processed: stats.processed,
                total: stats.total,
            });
            (RunStatus::Failed, Some(e.to_string()))
        }
    };

    let report = RunReport {
        kind: ctx.kind,
        run_id: ctx.run_id.clone(),
        status,
        started_at: ctx.now,
        finished_at: Utc::now(),
        stats,
        error,
    };
    if let Err(e) = deps.db.finish_run(&report.summary()) {
        tracing::warn!("⚠️ Could not record end of {}: {e}", ctx.run_id);
    }
    tracing::info!(
        "⏹️ Job {} finished: {} ({}/{} processed)",
        ctx.kind,
        status.as_str(),
        report.stats.processed,
        report.stats.total
    );
    report
}
