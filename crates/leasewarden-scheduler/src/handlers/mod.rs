//! Status-transition handlers: ACTIVE → EXPIRED and EXPIRED → DELETED.

pub mod delete;
pub mod expire;

use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::types::ManagedResource;
use serde_json::json;

use crate::scanner::ItemInfo;

pub(crate) fn resource_info(r: &ManagedResource) -> ItemInfo {
    ItemInfo {
        key: r.id.clone(),
        resource_id: Some(r.id.clone()),
        user_id: Some(r.owner_id.clone()),
        details: json!({
            "resource_id": r.id,
            "name": r.name,
            "status": r.status.as_str(),
            "external_id": r.external_id,
            "expires_at": r.expires_at.to_rfc3339(),
        }),
    }
}

/// The control-plane id, or a per-item error when the resource has none.
pub(crate) fn external_id(r: &ManagedResource) -> Result<&str> {
    r.external_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| LeaseError::MissingExternalId(r.id.clone()))
}
