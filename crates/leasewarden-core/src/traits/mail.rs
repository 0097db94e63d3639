//! Mail transport trait.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send one HTML mail. Returns the provider's response text.
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<String>;
}
