//! Data model: leased resources, outbound notifications, audit entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Managed resources ──────────────────────────────────────

/// Lifecycle state of a leased resource.
///
/// Within the lifecycle jobs a resource only moves forward:
/// `Active → Expired → Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Pending,
    Active,
    Expired,
    Deleted,
    CreationFailed,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Deleted => "DELETED",
            Self::CreationFailed => "CREATION_FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "ACTIVE" => Some(Self::Active),
            "EXPIRED" => Some(Self::Expired),
            "DELETED" => Some(Self::Deleted),
            "CREATION_FAILED" => Some(Self::CreationFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leased compute resource (e.g. a rented game server).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedResource {
    pub id: String,
    /// Display name used in reminder mails.
    pub name: String,
    pub owner_id: String,
    /// Where reminders for this resource are addressed.
    pub owner_email: String,
    /// Control-plane reference. Absent when provisioning never completed.
    pub external_id: Option<String>,
    pub status: ResourceStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ManagedResource {
    /// A fresh active resource expiring at `expires_at`.
    pub fn new(name: &str, owner_id: &str, owner_email: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            owner_email: owner_email.to_string(),
            external_id: None,
            status: ResourceStatus::Active,
            expires_at,
            created_at: Utc::now(),
        }
    }

    pub fn with_external_id(mut self, external_id: &str) -> Self {
        self.external_id = Some(external_id.to_string());
        self
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    /// When the resource becomes eligible for deletion.
    pub fn delete_at(&self, retention_days: i64) -> DateTime<Utc> {
        self.expires_at + chrono::Duration::days(retention_days)
    }
}

// ─── Notifications ──────────────────────────────────────

/// The specific reminder a notification carries. Together with the
/// resource id this is the dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderKind {
    ExpiresIn1Day,
    ExpiresIn7Days,
    DeletesIn1Day,
    DeletesIn7Days,
}

/// The two reminder families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderFamily {
    Expiry,
    Deletion,
}

impl ReminderKind {
    pub const EXPIRY: [ReminderKind; 2] = [Self::ExpiresIn1Day, Self::ExpiresIn7Days];
    pub const DELETION: [ReminderKind; 2] = [Self::DeletesIn1Day, Self::DeletesIn7Days];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExpiresIn1Day => "EXPIRES_IN_1_DAY",
            Self::ExpiresIn7Days => "EXPIRES_IN_7_DAYS",
            Self::DeletesIn1Day => "DELETES_IN_1_DAY",
            Self::DeletesIn7Days => "DELETES_IN_7_DAYS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EXPIRES_IN_1_DAY" => Some(Self::ExpiresIn1Day),
            "EXPIRES_IN_7_DAYS" => Some(Self::ExpiresIn7Days),
            "DELETES_IN_1_DAY" => Some(Self::DeletesIn1Day),
            "DELETES_IN_7_DAYS" => Some(Self::DeletesIn7Days),
            _ => None,
        }
    }

    pub fn family(&self) -> ReminderFamily {
        match self {
            Self::ExpiresIn1Day | Self::ExpiresIn7Days => ReminderFamily::Expiry,
            Self::DeletesIn1Day | Self::DeletesIn7Days => ReminderFamily::Deletion,
        }
    }

    /// Days between the reminder and the terminal event.
    pub fn lead_days(&self) -> i64 {
        match self {
            Self::ExpiresIn1Day | Self::DeletesIn1Day => 1,
            Self::ExpiresIn7Days | Self::DeletesIn7Days => 7,
        }
    }

    /// Resource status a resource must be in to receive this reminder.
    pub fn resource_status(&self) -> ResourceStatus {
        match self.family() {
            ReminderFamily::Expiry => ResourceStatus::Active,
            ReminderFamily::Deletion => ResourceStatus::Expired,
        }
    }
}

impl std::fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of a notification row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    /// Retry cap reached; never selected again.
    Exhausted,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Exhausted => "EXHAUSTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "SENT" => Some(Self::Sent),
            "FAILED" => Some(Self::Failed),
            "EXHAUSTED" => Some(Self::Exhausted),
            _ => None,
        }
    }
}

/// An outbound mail waiting for (or past) delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub resource_id: String,
    pub kind: ReminderKind,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: NotificationStatus,
    pub retries: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// A notification about to be enqueued.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub resource_id: String,
    pub kind: ReminderKind,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

// ─── Audit log ──────────────────────────────────────

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Self::Info),
            "WARN" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            "FATAL" => Some(Self::Fatal),
            _ => None,
        }
    }
}

/// One persisted audit entry. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub job_type: String,
    pub job_run: String,
    pub level: LogLevel,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub resource_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a finished (or aborted) job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Summary row for the recent-runs view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub job_type: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub processed: u64,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub last_error: Option<String>,
}
