//! Expire handler: suspend servers whose lease ran out.

use async_trait::async_trait;
use leasewarden_core::error::Result;
use leasewarden_core::types::{LogLevel, ManagedResource, ResourceStatus};
use leasewarden_db::ResourceFilter;
use serde_json::json;

use super::{external_id, resource_info};
use crate::context::{JobContext, JobDeps};
use crate::scanner::{self, BatchJob, ItemInfo, ItemOutcome};
use crate::stats::ScanStats;

/// ACTIVE resources with `expires_at <= now`.
pub struct ExpireJob<'a> {
    deps: &'a JobDeps,
    filter: ResourceFilter,
}

impl<'a> ExpireJob<'a> {
    pub fn new(deps: &'a JobDeps, ctx: &JobContext) -> Self {
        Self {
            deps,
            filter: ResourceFilter::due(ResourceStatus::Active, ctx.now),
        }
    }
}

#[async_trait]
impl BatchJob for ExpireJob<'_> {
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
        ctx.log.resource(
            LogLevel::Info,
            r,
            "Suspending expired server",
            json!({ "external_id": server, "expires_at": r.expires_at.to_rfc3339() }),
        );

        self.deps.control_plane.suspend(server).await?;

        if self
            .deps
            .db
            .transition_status(&r.id, ResourceStatus::Active, ResourceStatus::Expired)?
        {
            ctx.log.resource(
                LogLevel::Info,
                r,
                "Resource expired",
                json!({ "from": "ACTIVE", "to": "EXPIRED", "external_id": server }),
            );
            Ok(ItemOutcome::Done)
        } else {
            ctx.log.resource(
                LogLevel::Warn,
                r,
                "Status changed during expiry, leaving resource as is",
                json!({ "expected": "ACTIVE", "external_id": server }),
            );
            Ok(ItemOutcome::Skipped("status changed concurrently".into()))
        }
    }
}

pub async fn run(deps: &JobDeps, ctx: &JobContext) -> Result<ScanStats> {
    let job = ExpireJob::new(deps, ctx);
    ctx.add_total(job.count()?);
    scanner::drain(ctx, &job, deps.settings.batch_size).await?;
    Ok(ctx.stats())
}
