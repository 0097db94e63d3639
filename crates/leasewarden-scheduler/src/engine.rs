//! Scheduler engine: fires lifecycle jobs on their cron schedules.
//! Uses tokio::interval for ticking; sleeps between checks.

use std::time::Duration;

use chrono::{DateTime, Utc};
use leasewarden_core::config::JobsConfig;
use leasewarden_core::error::{LeaseError, Result};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cron::CronSchedule;
use crate::kind::JobKind;
use crate::runner::JobRunner;

/// One job on its schedule.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub kind: JobKind,
    pub expression: String,
    schedule: CronSchedule,
    pub next_run: Option<DateTime<Utc>>,
}

/// The scheduler engine: owns the schedule table and the runner.
pub struct SchedulerEngine {
    runner: JobRunner,
    jobs: Vec<ScheduledJob>,
}

impl SchedulerEngine {
    /// Build the schedule table. An invalid expression is a config error.
    pub fn new(runner: JobRunner, config: &JobsConfig, now: DateTime<Utc>) -> Result<Self> {
        let mut jobs = Vec::new();
        for kind in JobKind::ALL {
            let Some(expression) = config.schedule_for(kind.name()) else {
                continue;
            };
            if expression.trim().is_empty() || expression.trim() == "off" {
                tracing::info!("⏸️ Job {kind} disabled");
                continue;
            }
            let schedule = CronSchedule::parse(&expression)
                .map_err(|e| LeaseError::Config(format!("schedule for {kind}: {e}")))?;
            let next_run = schedule.next_after(now);
            jobs.push(ScheduledJob {
                kind,
                expression,
                schedule,
                next_run,
            });
        }
        Ok(Self { runner, jobs })
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// Jobs due at `now`; their next run is moved forward.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<JobKind> {
        let mut due = Vec::new();
        for job in self.jobs.iter_mut() {
            if job.next_run.is_some_and(|t| t <= now) {
                due.push(job.kind);
                job.next_run = job.schedule.next_after(now);
            }
        }
        due
    }

    /// Tick: start every due job that is not already running.
    pub fn tick(&mut self, now: DateTime<Utc>, running: &mut JoinSet<()>) {
        for kind in self.due(now) {
            match self.runner.start(kind) {
                Ok(handle) => {
                    tracing::info!("🔔 Job triggered: {kind} ({})", handle.run_id);
                    running.spawn(async move {
                        if let Err(e) = handle.wait().await {
                            tracing::error!("❌ Job {kind} task failed: {e}");
                        }
                    });
                }
                Err(LeaseError::AlreadyRunning(_)) => {
                    tracing::warn!("⏭️ Job {kind} still running, skipping this slot");
                }
                Err(e) => tracing::error!("❌ Job {kind} could not start: {e}"),
            }
        }
    }
}

/// Run the engine until `shutdown` fires, then stop running jobs and
/// wait for them to write their terminal entries.
pub async fn spawn_scheduler(mut engine: SchedulerEngine, check_interval_secs: u64, shutdown: CancellationToken) {
    tracing::info!(
        "⏰ Scheduler started ({} jobs, checking every {}s)",
        engine.jobs.len(),
        check_interval_secs
    );
    for job in &engine.jobs {
        tracing::info!("📅 {} '{}' next at {:?}", job.kind, job.expression, job.next_run);
    }

    let mut interval = tokio::time::interval(Duration::from_secs(check_interval_secs.max(1)));
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                while running.try_join_next().is_some() {}
                engine.tick(Utc::now(), &mut running);
            }
            _ = shutdown.cancelled() => break,
        }
    }

    tracing::info!("🛑 Scheduler stopping, cancelling {} running job(s)", running.len());
    engine.runner.stop_all();
    while running.join_next().await.is_some() {}
    tracing::info!("👋 Scheduler stopped");
}
