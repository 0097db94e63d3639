//! Latest-version lookup over HTTP.
//!
//! Accepts either a JSON document (`{"version": "..."}`, or GitHub's
//! `{"tag_name": "v..."}`) or a plain-text body containing just the version.

use async_trait::async_trait;
use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::traits::VersionSource;
use std::time::Duration;

pub struct HttpVersionSource {
    client: reqwest::Client,
    url: String,
}

impl HttpVersionSource {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

/// Pull the version string out of a response body.
pub(crate) fn extract_version(body: &str) -> Result<String> {
    let trimmed = body.trim();
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(v) = json["version"].as_str().or_else(|| json["tag_name"].as_str()) {
            return Ok(v.trim().to_string());
        }
        if let Some(v) = json.as_str() {
            return Ok(v.trim().to_string());
        }
        return Err(LeaseError::Version("no version field in response".into()));
    }
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        return Err(LeaseError::Version(format!("unrecognised version body: {trimmed:.40}")));
    }
    Ok(trimmed.to_string())
}

#[async_trait]
impl VersionSource for HttpVersionSource {
    async fn latest_version(&self) -> Result<String> {
        let resp = self
            .client
            .get(&self.url)
            .header("User-Agent", concat!("leasewarden/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .map_err(|e| LeaseError::http(format!("version lookup failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(LeaseError::Version(format!("version source returned {}", resp.status())));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| LeaseError::http(format!("version body: {e}")))?;
        extract_version(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_version_shapes() {
        assert_eq!(extract_version(r#"{"version":"2.0.10"}"#).unwrap(), "2.0.10");
        assert_eq!(extract_version(r#"{"tag_name":"v2.1.0"}"#).unwrap(), "v2.1.0");
        assert_eq!(extract_version("2.0.9\n").unwrap(), "2.0.9");
        assert!(extract_version(r#"{"name":"x"}"#).is_err());
        assert!(extract_version("<html> not found </html>").is_err());
    }
}
