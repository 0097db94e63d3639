//! Provisioning API client: suspend and delete game servers over HTTP.
//!
//! Talks to a Pterodactyl-style application API:
//! `POST {base}/api/application/servers/{id}/suspend` and
//! `DELETE {base}/api/application/servers/{id}`, authenticated with a
//! bearer token. Every call carries a timeout so a stuck request cannot
//! hang a whole job run.

use async_trait::async_trait;
use leasewarden_core::config::ControlPlaneConfig;
use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::traits::ControlPlane;
use std::time::Duration;

/// HTTP control-plane client.
pub struct HttpControlPlane {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpControlPlane {
    pub fn new(config: &ControlPlaneConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn server_url(&self, external_id: &str, action: Option<&str>) -> String {
        match action {
            Some(action) => format!(
                "{}/api/application/servers/{}/{}",
                self.base_url, external_id, action
            ),
            None => format!("{}/api/application/servers/{}", self.base_url, external_id),
        }
    }

    async fn call(&self, req: reqwest::RequestBuilder, external_id: &str) -> Result<()> {
        let resp = req
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LeaseError::http(format!("control plane request failed: {e}")))?;

        let status = resp.status().as_u16();
        if resp.status().is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(error_for_status(status, body, external_id))
    }
}

/// Map a non-2xx answer. The body is kept as-is so it can be logged verbatim.
pub(crate) fn error_for_status(status: u16, body: String, external_id: &str) -> LeaseError {
    if status == 404 {
        LeaseError::ControlPlaneNotFound(external_id.to_string())
    } else {
        LeaseError::ControlPlane { status, body }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    fn name(&self) -> &str {
        "pterodactyl"
    }

    async fn suspend(&self, external_id: &str) -> Result<()> {
        let url = self.server_url(external_id, Some("suspend"));
        tracing::debug!("⏸️ Suspending server {external_id}");
        self.call(self.client.post(&url), external_id).await
    }

    async fn delete(&self, external_id: &str) -> Result<()> {
        let url = self.server_url(external_id, None);
        tracing::debug!("🗑️ Deleting server {external_id}");
        self.call(self.client.delete(&url), external_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpControlPlane {
        HttpControlPlane::new(&ControlPlaneConfig {
            base_url: "https://panel.example.com/".into(),
            api_key: "key".into(),
            ..Default::default()
        })
    }

    #[test]
    fn test_server_urls() {
        let cp = client();
        assert_eq!(
            cp.server_url("42", Some("suspend")),
            "https://panel.example.com/api/application/servers/42/suspend"
        );
        assert_eq!(
            cp.server_url("42", None),
            "https://panel.example.com/api/application/servers/42"
        );
    }

    #[test]
    fn test_error_body_kept_verbatim() {
        let body = r#"{"errors":[{"code":"ConflictingServerStateException","detail":"busy"}]}"#;
        match error_for_status(409, body.to_string(), "42") {
            LeaseError::ControlPlane { status, body: b } => {
                assert_eq!(status, 409);
                assert_eq!(b, body);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            error_for_status(404, String::new(), "42"),
            LeaseError::ControlPlaneNotFound(id) if id == "42"
        ));
    }
}
