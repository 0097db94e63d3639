//! Cooperative cancellation and progress reporting for one job run.
//!
//! The runner keeps the [`JobControl`] half; the caller gets a
//! [`JobHandle`] to stop the run, watch its events and await the result.

use leasewarden_core::error::{LeaseError, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::kind::JobKind;
use crate::run_id::RunId;
use crate::stats::RunReport;

/// Messages a running job sends to whoever started it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress { processed: u64, total: u64 },
    Completed { processed: u64, total: u64 },
    Failed { error: String, processed: u64, total: u64 },
}

/// The job's side of the control channel.
#[derive(Debug, Clone)]
pub struct JobControl {
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<JobEvent>,
}

impl JobControl {
    /// A control pair: the job keeps `JobControl`, the caller gets the
    /// token and the event receiver.
    pub fn channel() -> (Self, CancellationToken, mpsc::UnboundedReceiver<JobEvent>) {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                cancel: cancel.clone(),
                events: tx,
            },
            cancel,
            rx,
        )
    }

    /// A control whose events go nowhere (synchronous triggers).
    pub fn detached() -> Self {
        Self::channel().0
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Send an event. A caller that stopped listening is not an error.
    pub fn emit(&self, event: JobEvent) {
        let _ = self.events.send(event);
    }

    pub fn progress(&self, processed: u64, total: u64) {
        self.emit(JobEvent::Progress { processed, total });
    }
}

/// Caller's side of a started run.
pub struct JobHandle {
    pub kind: JobKind,
    pub run_id: RunId,
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<JobEvent>,
    join: JoinHandle<Result<RunReport>>,
}

impl JobHandle {
    pub(crate) fn new(
        kind: JobKind,
        run_id: RunId,
        cancel: CancellationToken,
        events: mpsc::UnboundedReceiver<JobEvent>,
        join: JoinHandle<Result<RunReport>>,
    ) -> Self {
        Self {
            kind,
            run_id,
            cancel,
            events,
            join,
        }
    }

    /// Token that stops the job at its next checkpoint.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the job is done and the channel drained.
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// Wait for the run to end. Events the job emits from here on are
    /// dropped at the source.
    pub async fn wait(self) -> Result<RunReport> {
        let Self { events, join, .. } = self;
        drop(events);
        join.await
            .map_err(|e| LeaseError::Internal(format!("job task failed: {e}")))?
    }

    /// Wait for the run, collecting every event it emitted on the way.
    pub async fn collect(mut self) -> (Vec<JobEvent>, Result<RunReport>) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let result = self.wait().await;
        (events, result)
    }
}
