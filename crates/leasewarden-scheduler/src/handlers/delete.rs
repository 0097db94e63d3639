//! Delete handler: remove suspended servers once retention has passed.

use async_trait::async_trait;
use chrono::Duration;
use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::types::{LogLevel, ManagedResource, ResourceStatus};
use leasewarden_db::ResourceFilter;
use serde_json::json;

use super::{external_id, resource_info};
use crate::context::{JobContext, JobDeps};
use crate::scanner::{self, BatchJob, ItemInfo, ItemOutcome};
use crate::stats::ScanStats;

/// EXPIRED resources with `expires_at <= now - retention`.
pub struct DeleteJob<'a> {
    deps: &'a JobDeps,
    filter: ResourceFilter,
}

impl<'a> DeleteJob<'a> {
    pub fn new(deps: &'a JobDeps, ctx: &JobContext) -> Self {
        let cutoff = ctx.now - Duration::days(deps.settings.retention_days);
        Self {
            deps,
            filter: ResourceFilter::due(ResourceStatus::Expired, cutoff),
        }
    }
}

#[async_trait]
impl BatchJob for DeleteJob<'_> {
    type Item = ManagedResource;

    fn count(&self) -> Result<u64> {
        self.deps.db.count_resources(&self.filter)
    }

    fn fetch(&self, exclude: &[String], limit: usize) -> Result<Vec<ManagedResource>> {
        self.deps.db.fetch_resources(&self.filter, exclude, limit)
    }

    fn describe(&self, item: &ManagedResource) -> ItemInfo {
        resource_info(item)
    }

    async fn process(&self, ctx: &JobContext, r: &ManagedResource) -> Result<ItemOutcome> {
        let server = external_id(r)?;
        let delete_at = r.delete_at(self.deps.settings.retention_days);
        ctx.log.resource(
            LogLevel::Info,
            r,
            "Deleting server past retention",
            json!({ "external_id": server, "delete_at": delete_at.to_rfc3339() }),
        );

        match self.deps.control_plane.delete(server).await {
            Ok(()) => {}
            Err(LeaseError::ControlPlaneNotFound(_)) if self.deps.settings.treat_missing_as_deleted => {
                ctx.log.resource(
                    LogLevel::Warn,
                    r,
                    "Server already gone on the control plane, recording as deleted",
                    json!({ "external_id": server }),
                );
            }
            Err(e) => return Err(e),
        }

        if self
            .deps
            .db
            .transition_status(&r.id, ResourceStatus::Expired, ResourceStatus::Deleted)?
        {
            ctx.log.resource(
                LogLevel::Info,
                r,
                "Resource deleted",
                json!({ "from": "EXPIRED", "to": "DELETED", "external_id": server }),
            );
            Ok(ItemOutcome::Done)
        } else {
            ctx.log.resource(
                LogLevel::Warn,
                r,
                "Status changed during deletion, leaving resource as is",
                json!({ "expected": "EXPIRED", "external_id": server }),
            );
            Ok(ItemOutcome::Skipped("status changed concurrently".into()))
        }
    }
}

pub async fn run(deps: &JobDeps, ctx: &JobContext) -> Result<ScanStats> {
    let job = DeleteJob::new(deps, ctx);
    ctx.add_total(job.count()?);
    scanner::drain(ctx, &job, deps.settings.batch_size).await?;
    Ok(ctx.stats())
}
