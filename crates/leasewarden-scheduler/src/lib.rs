//! # LeaseWarden Scheduler
//!
//! Lifecycle jobs for leased game servers, and the framework that runs them.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (tokio interval, cron table)
//!   └── JobRunner: one run per job, run id, terminal entry, run summary
//!         ├── expire                  ACTIVE  → suspend → EXPIRED
//!         ├── delete                  EXPIRED → delete  → DELETED
//!         ├── expiry-reminders        queue EXPIRES_IN_{1,7}_DAY(S)
//!         ├── deletion-reminders      queue DELETES_IN_{1,7}_DAY(S)
//!         ├── dispatch-notifications  send, throttle, retry budget
//!         └── version-check           compare, alert side channel
//!
//! Every scan job goes through the batch scanner:
//!   cancel check → fetch batch → per-item handle → progress → repeat
//! ```

pub mod audit;
pub mod context;
pub mod control;
pub mod cron;
pub mod dispatcher;
pub mod engine;
pub mod handlers;
pub mod kind;
pub mod reminders;
pub mod run_id;
pub mod runner;
pub mod scanner;
pub mod stats;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{AuditLogger, AuditSink, JobLogger};
pub use context::{JobContext, JobDeps, JobSettings};
pub use control::{JobControl, JobEvent, JobHandle};
pub use engine::{SchedulerEngine, spawn_scheduler};
pub use kind::JobKind;
pub use run_id::RunId;
pub use runner::{JobRunner, TriggerResult};
pub use scanner::{BatchJob, DrainPolicy, ItemOutcome};
pub use stats::{RunReport, ScanStats};
