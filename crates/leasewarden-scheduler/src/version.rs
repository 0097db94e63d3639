//! Version checker: alert operators when a new release is published.

use std::cmp::Ordering;

use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::traits::side_channel::escape_html;
use serde_json::json;

use crate::context::{ItemResult, JobContext, JobDeps};
use crate::stats::ScanStats;

/// Settings key holding the last version operators were told about.
pub const CACHED_VERSION_KEY: &str = "cached_version";

/// What a check concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// Nothing cached yet; the latest version was stored without an alert.
    Seeded(String),
    Unchanged(String),
    Changed { old: String, new: String, alerted: bool },
}

/// Parse leniently: `v2.1` → `2.1.0`.
fn normalize(raw: &str) -> Option<semver::Version> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V']);
    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, rest) = trimmed.split_at(split);
    let mut core = core.to_string();
    for _ in core.matches('.').count()..2 {
        core.push_str(".0");
    }
    semver::Version::parse(&format!("{core}{rest}")).ok()
}

/// Compare two version strings. Semantic versions compare numerically
/// (`2.0.10 > 2.0.9`); anything else falls back to text comparison.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (normalize(a), normalize(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.trim().cmp(b.trim()),
    }
}

/// Alert text, HTML-escaped for the side channel.
pub fn alert_message(old: &str, new: &str, branch: Option<&str>) -> String {
    let mut msg = format!(
        "🆕 <b>New version available</b>\nCurrent: {}\nLatest: {}",
        escape_html(old),
        escape_html(new)
    );
    if let Some(branch) = branch.filter(|b| !b.is_empty()) {
        msg.push_str(&format!("\nBranch: {}", escape_html(branch)));
    }
    msg
}

pub async fn check(deps: &JobDeps, ctx: &JobContext) -> Result<VersionCheck> {
    let source = deps
        .version_source
        .as_ref()
        .ok_or_else(|| LeaseError::Version("no version source configured".into()))?;
    let latest = source.latest_version().await?.trim().to_string();
    if latest.is_empty() {
        return Err(LeaseError::Version("version source returned an empty version".into()));
    }

    let Some(cached) = deps.db.get_setting(CACHED_VERSION_KEY)? else {
        deps.db.set_setting(CACHED_VERSION_KEY, &latest)?;
        ctx.log.info("Version cache seeded", Some(json!({ "version": latest })));
        return Ok(VersionCheck::Seeded(latest));
    };

    if compare_versions(&cached, &latest) == Ordering::Equal {
        ctx.log.info("Version unchanged", Some(json!({ "version": latest })));
        return Ok(VersionCheck::Unchanged(latest));
    }

    let message = alert_message(&cached, &latest, deps.settings.branch.as_deref());
    let alerted = match &deps.side_channel {
        Some(channel) => channel.send(&message).await,
        None => false,
    };
    let details = json!({ "old": cached, "new": latest, "alerted": alerted });

    // Keep the old value when delivery failed so the next run retries it.
    if alerted || deps.side_channel.is_none() {
        deps.db.set_setting(CACHED_VERSION_KEY, &latest)?;
        ctx.log.info("New version detected", Some(details));
    } else {
        ctx.log.warn("New version detected but alert was not delivered", Some(details));
    }
    Ok(VersionCheck::Changed {
        old: cached,
        new: latest,
        alerted,
    })
}

pub async fn run(deps: &JobDeps, ctx: &JobContext) -> Result<ScanStats> {
    ctx.add_total(1);
    if ctx.is_cancelled() {
        return Err(LeaseError::Cancelled { processed: 0, total: 1 });
    }
    check(deps, ctx).await?;
    ctx.record_item(ItemResult::Succeeded);
    Ok(ctx.stats())
}


#[cfg(test)]
mod run_tests {
    use super::*;
    use crate::kind::JobKind;
    use crate::testing::Harness;

    #[tokio::test]
    async fn test_alerts_once_on_new_version() {
        let h = Harness::new();
        h.db.set_setting(CACHED_VERSION_KEY, "2.0.9").unwrap();
        *h.version.0.lock().unwrap() = "2.0.10".into();

        let outcome = check(&h.deps, &h.context(JobKind::VersionCheck)).await.unwrap();
        assert_eq!(
            outcome,
            VersionCheck::Changed { old: "2.0.9".into(), new: "2.0.10".into(), alerted: true }
        );
        let messages = h.side_channel.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("2.0.9") && messages[0].contains("2.0.10"));
        assert_eq!(h.db.get_setting(CACHED_VERSION_KEY).unwrap().as_deref(), Some("2.0.10"));

        let outcome = check(&h.deps, &h.context(JobKind::VersionCheck)).await.unwrap();
        assert_eq!(outcome, VersionCheck::Unchanged("2.0.10".into()));
        assert_eq!(h.side_channel.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_alert_when_equal_or_unseeded() {
        let h = Harness::new();
        let outcome = check(&h.deps, &h.context(JobKind::VersionCheck)).await.unwrap();
        assert_eq!(outcome, VersionCheck::Seeded("2.0.9".into()));

        let outcome = check(&h.deps, &h.context(JobKind::VersionCheck)).await.unwrap();
        assert_eq!(outcome, VersionCheck::Unchanged("2.0.9".into()));
        assert!(h.side_channel.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undelivered_alert_keeps_cache() {
        let h = Harness::new();
        h.db.set_setting(CACHED_VERSION_KEY, "2.0.9").unwrap();
        *h.version.0.lock().unwrap() = "2.1.0".into();
        *h.side_channel.down.lock().unwrap() = true;

        let outcome = check(&h.deps, &h.context(JobKind::VersionCheck)).await.unwrap();
        assert!(matches!(outcome, VersionCheck::Changed { alerted: false, .. }));
        assert_eq!(h.db.get_setting(CACHED_VERSION_KEY).unwrap().as_deref(), Some("2.0.9"));
    }
}
