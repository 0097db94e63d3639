//! Source of the latest published version.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Fetch the latest published version string.
    async fn latest_version(&self) -> Result<String>;
}
