//! Reminder generators: queue "expires in N days" and "deletes in N days"
//! mails for resources entering a reminder window.
//!
//! Windows are half-open `[start, end)` on the event time and form a
//! ladder per family: the 1-day reminder covers `[now, now+1d)`, the
//! 7-day reminder `[now+1d, now+7d)`. For deletion the event time is
//! `expires_at + retention`, so the window is shifted back by the
//! retention period before being applied to `expires_at`. Windows are
//! wider than the run cadence, so a skipped run does not lose reminders.
//!
//! Dedup relies on the unique (resource, kind) index: a resource already
//! holding a notification of a kind is excluded by the query, and a
//! concurrent insert is ignored by the store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::traits::ReminderContext;
use leasewarden_core::types::{LogLevel, ManagedResource, NewNotification, ReminderFamily, ReminderKind};
use leasewarden_db::ResourceFilter;
use serde_json::json;

use crate::context::{JobContext, JobDeps};
use crate::handlers::resource_info;
use crate::scanner::{self, BatchJob, ItemInfo, ItemOutcome};
use crate::stats::ScanStats;

/// Acceptance window on `expires_at` for `kind`, evaluated at `now`.
pub fn reminder_window(
    kind: ReminderKind,
    now: DateTime<Utc>,
    retention_days: i64,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let (near, far) = match kind {
        ReminderKind::ExpiresIn1Day | ReminderKind::DeletesIn1Day => (0, 1),
        ReminderKind::ExpiresIn7Days | ReminderKind::DeletesIn7Days => (1, 7),
    };
    let shift = match kind.family() {
        ReminderFamily::Expiry => Duration::zero(),
        ReminderFamily::Deletion => Duration::days(retention_days),
    };
    (
        now + Duration::days(near) - shift,
        now + Duration::days(far) - shift,
    )
}

/// One reminder kind, drained like any other scan.
pub struct ReminderJob<'a> {
    deps: &'a JobDeps,
    kind: ReminderKind,
    filter: ResourceFilter,
}

impl<'a> ReminderJob<'a> {
    pub fn new(deps: &'a JobDeps, ctx: &JobContext, kind: ReminderKind) -> Self {
        let (start, end) = reminder_window(kind, ctx.now, deps.settings.retention_days);
        Self {
            deps,
            kind,
            filter: ResourceFilter::reminder_window(kind, start, end),
        }
    }

    fn render(&self, r: &ManagedResource) -> Result<NewNotification> {
        let recipient = r.owner_email.trim();
        if recipient.is_empty() {
            return Err(LeaseError::Render(format!("resource {} has no owner email", r.id)));
        }
        let message = self.deps.templates.render(&ReminderContext {
            resource: r,
            kind: self.kind,
            expires_at: r.expires_at,
            delete_at: r.delete_at(self.deps.settings.retention_days),
        })?;
        Ok(NewNotification {
            resource_id: r.id.clone(),
            kind: self.kind,
            recipient: recipient.to_string(),
            subject: message.subject,
            body: message.html,
        })
    }
}

#[async_trait]
impl BatchJob for ReminderJob<'_> {
    type Item = ManagedResource;

    fn count(&self) -> Result<u64> {
        self.deps.db.count_resources(&self.filter)
    }

    fn fetch(&self, exclude: &[String], limit: usize) -> Result<Vec<ManagedResource>> {
        self.deps.db.fetch_resources(&self.filter, exclude, limit)
    }

    fn describe(&self, item: &ManagedResource) -> ItemInfo {
        let mut info = resource_info(item);
        info.details["kind"] = json!(self.kind.as_str());
        info
    }

    async fn process(&self, ctx: &JobContext, r: &ManagedResource) -> Result<ItemOutcome> {
        let notification = self.render(r)?;
        match self.deps.db.insert_notification(&notification)? {
            Some(id) => {
                ctx.log.resource(
                    LogLevel::Info,
                    r,
                    "Reminder queued",
                    json!({
                        "notification_id": id,
                        "kind": self.kind.as_str(),
                        "recipient": notification.recipient,
                    }),
                );
                Ok(ItemOutcome::Done)
            }
            None => Ok(ItemOutcome::Skipped(format!("{} already queued", self.kind))),
        }
    }
}

/// Generate both reminder kinds of a family in one run.
pub async fn run(deps: &JobDeps, ctx: &JobContext, family: ReminderFamily) -> Result<ScanStats> {
    let kinds = match family {
        ReminderFamily::Expiry => ReminderKind::EXPIRY,
        ReminderFamily::Deletion => ReminderKind::DELETION,
    };
    let jobs: Vec<ReminderJob<'_>> = kinds
        .into_iter()
        .map(|kind| ReminderJob::new(deps, ctx, kind))
        .collect();

    for job in &jobs {
        ctx.add_total(job.count()?);
    }
    for job in &jobs {
        scanner::drain(ctx, job, deps.settings.batch_size).await?;
    }
    Ok(ctx.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::JobKind;
    use crate::testing::Harness;
    use chrono::TimeZone;
    use leasewarden_core::types::ResourceStatus;

    #[test]
    fn test_expiry_ladder() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let (s1, e1) = reminder_window(ReminderKind::ExpiresIn1Day, now, 7);
        let (s7, e7) = reminder_window(ReminderKind::ExpiresIn7Days, now, 7);
        assert_eq!(s1, now);
        assert_eq!(e1, now + Duration::days(1));
        assert_eq!(s7, e1);
        assert_eq!(e7, now + Duration::days(7));
    }

    #[test]
    fn test_deletion_windows_shifted_by_retention() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let (s1, e1) = reminder_window(ReminderKind::DeletesIn1Day, now, 7);
        assert_eq!(s1, now - Duration::days(7));
        assert_eq!(e1, now - Duration::days(6));
        // A resource that expired 6.5 days ago is deleted in half a day.
        let expired = now - Duration::hours(156);
        assert!(expired >= s1 && expired < e1);

        let (s7, e7) = reminder_window(ReminderKind::DeletesIn7Days, now, 7);
        assert_eq!(s7, e1);
        assert_eq!(e7, now);
    }

    #[tokio::test]
    async fn test_expiry_generator_is_idempotent() {
        let h = Harness::new();
        let now = Utc::now();
        let soon = h.resource("soon", ResourceStatus::Active, now + Duration::hours(12));
        let week = h.resource("week", ResourceStatus::Active, now + Duration::days(4));
        h.resource("far", ResourceStatus::Active, now + Duration::days(30));
        h.resource("expired", ResourceStatus::Expired, now + Duration::hours(12));

        let first = run(&h.deps, &h.context(JobKind::ExpiryReminders), ReminderFamily::Expiry)
            .await
            .unwrap();
        assert_eq!((first.total, first.succeeded), (2, 2));
        assert!(h.db.notification_exists(&soon.id, ReminderKind::ExpiresIn1Day).unwrap());
        assert!(!h.db.notification_exists(&soon.id, ReminderKind::ExpiresIn7Days).unwrap());
        assert!(h.db.notification_exists(&week.id, ReminderKind::ExpiresIn7Days).unwrap());

        let second = run(&h.deps, &h.context(JobKind::ExpiryReminders), ReminderFamily::Expiry)
            .await
            .unwrap();
        assert_eq!(second.total, 0);
        assert_eq!(second.processed, 0);
        assert_eq!(h.db.count_dispatchable(4).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_deletion_generator_uses_delete_date() {
        let h = Harness::new();
        let now = Utc::now();
        // Expired 6.5 days ago with 7 days retention: deleted in half a day.
        let r = h.resource("old", ResourceStatus::Expired, now - Duration::hours(156));

        let stats = run(&h.deps, &h.context(JobKind::DeletionReminders), ReminderFamily::Deletion)
            .await
            .unwrap();
        assert_eq!(stats.succeeded, 1);
        assert!(h.db.notification_exists(&r.id, ReminderKind::DeletesIn1Day).unwrap());

        let queued = h.db.fetch_dispatchable(4, &[], 10).unwrap();
        let stored = h.db.get_resource(&r.id).unwrap().unwrap();
        let delete_at = stored.delete_at(7).to_rfc3339();
        assert!(queued[0].body.contains(&delete_at));
    }

    #[tokio::test]
    async fn test_render_failure_is_item_failure() {
        let h = Harness::new();
        let now = Utc::now();
        h.resource("", ResourceStatus::Active, now + Duration::hours(3));
        let ok = h.resource("ok", ResourceStatus::Active, now + Duration::hours(4));

        let stats = run(&h.deps, &h.context(JobKind::ExpiryReminders), ReminderFamily::Expiry)
            .await
            .unwrap();
        assert_eq!((stats.failed, stats.succeeded), (1, 1));
        assert!(h.db.notification_exists(&ok.id, ReminderKind::ExpiresIn1Day).unwrap());
    }
}
