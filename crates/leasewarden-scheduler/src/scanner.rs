//! Batch scanner: drains a predicate in bounded batches.
//!
//! Each outer iteration checks for cancellation, fetches up to
//! `batch_size` qualifying items, and handles them one by one. A failing
//! item is logged with its context and the scan moves on; only a failed
//! fetch aborts the run.
//!
//! Items that stay eligible after being handled (a skip, or a failure
//! whose retry budget for this run is spent) are handed back to `fetch`
//! as exclusions for the rest of the run, so a run always terminates and
//! every page holds fresh work.

use std::collections::HashMap;

use async_trait::async_trait;
use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::types::LogLevel;
use serde_json::{Value, json};

use crate::audit::Subject;
use crate::context::{ItemResult, JobContext};

/// Result of handling one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item was handled and left the predicate.
    Done,
    /// Nothing was done, for a benign reason.
    Skipped(String),
    /// The item failed in a way another attempt in this run must not
    /// repeat. Counted and logged like an error.
    Failed(String),
}

/// When to stop fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Stop after a fetch returns fewer rows than asked for.
    UntilShortBatch,
    /// Re-query until nothing eligible is left.
    UntilEmpty,
}

/// Identity and log context of an item.
#[derive(Debug, Clone)]
pub struct ItemInfo {
    pub key: String,
    pub resource_id: Option<String>,
    pub user_id: Option<String>,
    pub details: Value,
}

/// A unit of work the scanner can drain.
#[async_trait]
pub trait BatchJob: Send + Sync {
    type Item: Send + Sync;

    /// Number of items that qualify right now.
    fn count(&self) -> Result<u64>;

    /// Oldest-first page of qualifying items whose key is not in `exclude`.
    fn fetch(&self, exclude: &[String], limit: usize) -> Result<Vec<Self::Item>>;

    fn describe(&self, item: &Self::Item) -> ItemInfo;

    async fn process(&self, ctx: &JobContext, item: &Self::Item) -> Result<ItemOutcome>;

    fn drain_policy(&self) -> DrainPolicy {
        DrainPolicy::UntilShortBatch
    }

    /// Failed attempts allowed per item within one run.
    fn attempts_per_run(&self) -> u32 {
        1
    }
}

/// Drain `job` in batches of `batch_size`. Returns `Cancelled` if the
/// run was asked to stop before the predicate ran dry.
pub async fn drain<J: BatchJob>(ctx: &JobContext, job: &J, batch_size: usize) -> Result<()> {
    let batch_size = batch_size.max(1);
    let mut attempts: HashMap<String, u32> = HashMap::new();
    let mut excluded: Vec<String> = Vec::new();

    loop {
        if ctx.is_cancelled() {
            let stats = ctx.stats();
            ctx.log.warn(
                "Cancellation requested, stopping scan",
                Some(json!({
                    "processed": stats.processed,
                    "total": stats.total,
                    "succeeded": stats.succeeded,
                    "failed": stats.failed,
                })),
            );
            return Err(LeaseError::Cancelled {
                processed: stats.processed,
                total: stats.total,
            });
        }

        let fetched = job.fetch(&excluded, batch_size)?;
        let store_exhausted = fetched.len() < batch_size;
        if fetched.is_empty() {
            break;
        }

        let batch: Vec<(J::Item, ItemInfo)> = fetched
            .into_iter()
            .map(|item| {
                let info = job.describe(&item);
                (item, info)
            })
            .collect();
        ctx.record_batch(batch.len());

        for (item, info) in &batch {
            let result = match job.process(ctx, item).await {
                Ok(ItemOutcome::Done) => ItemResult::Succeeded,
                Ok(ItemOutcome::Skipped(reason)) => {
                    tracing::debug!(key = %info.key, "skipped: {reason}");
                    excluded.push(info.key.clone());
                    ItemResult::Skipped
                }
                Ok(ItemOutcome::Failed(reason)) => {
                    log_item_failure(ctx, info, &reason, &reason);
                    excluded.push(info.key.clone());
                    ItemResult::Failed
                }
                Err(e) => {
                    log_item_failure(ctx, info, &e.to_string(), &format!("{e:?}"));
                    let n = attempts.entry(info.key.clone()).or_insert(0);
                    *n += 1;
                    if *n >= job.attempts_per_run() {
                        excluded.push(info.key.clone());
                    }
                    ItemResult::Failed
                }
            };
            ctx.record_item(result);
        }

        if job.drain_policy() == DrainPolicy::UntilShortBatch && store_exhausted {
            break;
        }
    }
    Ok(())
}

fn log_item_failure(ctx: &JobContext, info: &ItemInfo, error: &str, error_debug: &str) {
    let mut details = info.details.clone();
    if let Value::Object(map) = &mut details {
        map.insert("error".into(), Value::String(error.into()));
        map.insert("error_debug".into(), Value::String(error_debug.into()));
    }
    ctx.log.log(
        LogLevel::Error,
        &format!("Failed to process {}", info.key),
        Some(details),
        Subject {
            resource_id: info.resource_id.as_deref(),
            user_id: info.user_id.as_deref(),
        },
    );
}
