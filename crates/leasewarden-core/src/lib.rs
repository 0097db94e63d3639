//! # LeaseWarden Core
//!
//! Shared vocabulary for the lifecycle jobs: the data model, the error type,
//! configuration, and the traits behind which every external collaborator
//! (control plane, mail transport, template renderer, side-channel, version
//! source) is hidden.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::LeaseConfig;
pub use error::{LeaseError, Result};
pub use types::{
    LogEntry, LogLevel, ManagedResource, NewNotification, NotificationRecord, NotificationStatus,
    ReminderFamily, ReminderKind, ResourceStatus, RunStatus, RunSummary,
};
