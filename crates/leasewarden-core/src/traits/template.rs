//! Reminder rendering trait.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{ManagedResource, ReminderKind};

/// Everything a reminder template may reference.
#[derive(Debug, Clone)]
pub struct ReminderContext<'a> {
    pub resource: &'a ManagedResource,
    pub kind: ReminderKind,
    /// When the lease runs out.
    pub expires_at: DateTime<Utc>,
    /// When the server and its data are removed (expiry + retention).
    pub delete_at: DateTime<Utc>,
}

/// A rendered mail.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub subject: String,
    pub html: String,
}

/// Pure `(resource, derived dates) -> html` renderer.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, ctx: &ReminderContext<'_>) -> Result<RenderedMessage>;
}
