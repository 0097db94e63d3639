//! Provisioning API trait: suspend and delete leased servers.

use async_trait::async_trait;

use crate::error::Result;

/// Remote control plane that owns the actual compute resources.
///
/// Implementations report non-2xx answers as
/// [`LeaseError::ControlPlane`](crate::error::LeaseError::ControlPlane) with the
/// response body untouched, and a missing server as
/// [`LeaseError::ControlPlaneNotFound`](crate::error::LeaseError::ControlPlaneNotFound).
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Suspend (stop and lock) a server.
    async fn suspend(&self, external_id: &str) -> Result<()>;

    /// Destroy a server and its data.
    async fn delete(&self, external_id: &str) -> Result<()>;
}
