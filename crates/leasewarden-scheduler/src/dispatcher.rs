//! Notification dispatcher: send queued reminders, oldest first.
//!
//! Every attempt is charged to the notification's retry budget before the
//! mail goes out and is followed by a fixed pause to respect provider
//! rate limits. Once the budget is spent the row becomes EXHAUSTED and is
//! never picked up again. Within a run, failed sends are retried until
//! their budget is spent. A send that went out but could not be marked
//! SENT is not retried in the same run.

use async_trait::async_trait;
use leasewarden_core::error::Result;
use leasewarden_core::types::{LogLevel, NotificationRecord, NotificationStatus};
use serde_json::json;

use crate::audit::Subject;
use crate::context::{JobContext, JobDeps};
use crate::scanner::{self, BatchJob, DrainPolicy, ItemInfo, ItemOutcome};
use crate::stats::ScanStats;

pub struct DispatchJob<'a> {
    deps: &'a JobDeps,
}

impl<'a> DispatchJob<'a> {
    pub fn new(deps: &'a JobDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl BatchJob for DispatchJob<'_> {
    type Item = NotificationRecord;

    fn count(&self) -> Result<u64> {
        self.deps.db.count_dispatchable(self.deps.settings.max_retries)
    }

    fn fetch(&self, exclude: &[String], limit: usize) -> Result<Vec<NotificationRecord>> {
        let exclude: Vec<i64> = exclude.iter().filter_map(|k| k.parse().ok()).collect();
        self.deps.db.fetch_dispatchable(self.deps.settings.max_retries, &exclude, limit)
    }

    fn describe(&self, n: &NotificationRecord) -> ItemInfo {
        ItemInfo {
            key: n.id.to_string(),
            resource_id: Some(n.resource_id.clone()),
            user_id: None,
            details: json!({
                "notification_id": n.id,
                "kind": n.kind.as_str(),
                "recipient": n.recipient,
                "status": n.status.as_str(),
                "retries": n.retries,
            }),
        }
    }

    async fn process(&self, ctx: &JobContext, n: &NotificationRecord) -> Result<ItemOutcome> {
        let max = self.deps.settings.max_retries;
        if !self.deps.db.claim_send_attempt(n.id, max)? {
            return Ok(ItemOutcome::Skipped("no longer dispatchable".into()));
        }

        let sent = self.deps.mail.send(&n.recipient, &n.subject, &n.body).await;
        tokio::time::sleep(self.deps.settings.throttle).await;

        let subject = Subject {
            resource_id: Some(&n.resource_id),
            user_id: None,
        };
        match sent {
            Ok(response) => {
                if let Err(e) = self.deps.db.mark_notification_sent(n.id) {
                    let reason = format!("sent but not recorded: {e}");
                    if let Err(e) = self.deps.db.record_send_failure(n.id, &reason, max) {
                        tracing::error!(notification_id = n.id, "could not record unconfirmed send: {e}");
                    }
                    return Ok(ItemOutcome::Failed(reason));
                }
                ctx.log.log(
                    LogLevel::Info,
                    "Reminder sent",
                    Some(json!({
                        "notification_id": n.id,
                        "kind": n.kind.as_str(),
                        "recipient": n.recipient,
                        "response": response,
                    })),
                    subject,
                );
                Ok(ItemOutcome::Done)
            }
            Err(e) => {
                let status = self.deps.db.record_send_failure(n.id, &e.to_string(), max)?;
                if status == NotificationStatus::Exhausted {
                    ctx.log.log(
                        LogLevel::Warn,
                        "Reminder gave up after retry budget",
                        Some(json!({ "notification_id": n.id, "max_retries": max })),
                        subject,
                    );
                }
                Err(e)
            }
        }
    }

    fn drain_policy(&self) -> DrainPolicy {
        DrainPolicy::UntilEmpty
    }

    fn attempts_per_run(&self) -> u32 {
        self.deps.settings.max_retries
    }
}

pub async fn run(deps: &JobDeps, ctx: &JobContext) -> Result<ScanStats> {
    let job = DispatchJob::new(deps);
    ctx.add_total(job.count()?);
    scanner::drain(ctx, &job, deps.settings.batch_size).await?;
    Ok(ctx.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::JobKind;
    use crate::testing::Harness;
    use leasewarden_core::types::{NewNotification, ReminderKind};
    use leasewarden_db::LeaseDb;

    fn queue(h: &Harness, resource_id: &str) -> i64 {
        h.db.insert_notification(&NewNotification {
            resource_id: resource_id.into(),
            kind: ReminderKind::ExpiresIn7Days,
            recipient: "owner@example.com".into(),
            subject: "Expiring".into(),
            body: "<p>soon</p>".into(),
        })
        .unwrap()
        .unwrap()
    }

    #[tokio::test]
    async fn test_sends_and_marks_sent() {
        let h = Harness::new();
        let a = queue(&h, "r1");
        let b = queue(&h, "r2");

        let stats = run(&h.deps, &h.context(JobKind::DispatchNotifications)).await.unwrap();
        assert_eq!((stats.total, stats.succeeded), (2, 2));
        assert_eq!(h.mail.sent.lock().unwrap().len(), 2);
        for id in [a, b] {
            let n = h.db.get_notification(id).unwrap().unwrap();
            assert_eq!(n.status, NotificationStatus::Sent);
        }
    }

    #[tokio::test]
    async fn test_retry_bound_then_exhausted() {
        let h = Harness::new();
        *h.mail.failing.lock().unwrap() = true;
        let id = queue(&h, "r1");

        let stats = run(&h.deps, &h.context(JobKind::DispatchNotifications)).await.unwrap();
        assert_eq!(stats.failed, 4);
        assert_eq!(*h.mail.attempts.lock().unwrap(), 4);

        let n = h.db.get_notification(id).unwrap().unwrap();
        assert_eq!(n.status, NotificationStatus::Exhausted);
        assert_eq!(n.retries, 4);
        assert_eq!(n.last_error.as_deref(), Some("Mail error: connection refused"));

        // Never picked up again, even once mail works.
        *h.mail.failing.lock().unwrap() = false;
        let again = run(&h.deps, &h.context(JobKind::DispatchNotifications)).await.unwrap();
        assert_eq!(again.processed, 0);
        assert_eq!(*h.mail.attempts.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_unrecorded_send_still_spends_budget() {
        let dir = std::env::temp_dir().join(format!("leasewarden-dispatch-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        let path = dir.join("leasewarden.db");
        let db = std::sync::Arc::new(LeaseDb::open(&path).unwrap());
        let settings = crate::context::JobSettings {
            throttle: std::time::Duration::ZERO,
            ..Default::default()
        };
        let h = Harness::with_db(db, settings);
        let id = queue(&h, "r1");

        // Every write of SENT is refused; failures can still be recorded
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER refuse_sent BEFORE UPDATE OF status ON notifications
             WHEN NEW.status = 'SENT'
             BEGIN SELECT RAISE(ABORT, 'attempt to write a readonly database'); END;",
        )
        .unwrap();
        drop(conn);

        let first = run(&h.deps, &h.context(JobKind::DispatchNotifications)).await.unwrap();
        assert_eq!((first.processed, first.failed), (1, 1));
        assert_eq!(*h.mail.attempts.lock().unwrap(), 1);

        for _ in 0..5 {
            run(&h.deps, &h.context(JobKind::DispatchNotifications)).await.unwrap();
        }
        assert_eq!(*h.mail.attempts.lock().unwrap(), 4);

        let n = h.db.get_notification(id).unwrap().unwrap();
        assert_eq!(n.status, NotificationStatus::Exhausted);
        assert_eq!(n.retries, 4);
        assert!(n.last_error.unwrap().starts_with("sent but not recorded"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_throttle_applies_after_each_attempt() {
        let mut settings = crate::context::JobSettings::default();
        settings.throttle = std::time::Duration::from_millis(30);
        let h = Harness::with_settings(settings);
        queue(&h, "r1");
        queue(&h, "r2");

        let started = std::time::Instant::now();
        run(&h.deps, &h.context(JobKind::DispatchNotifications)).await.unwrap();
        assert!(started.elapsed() >= std::time::Duration::from_millis(60));
    }
}
