//! Discord alert channel.
//!
//! Selectable in config but not wired to the webhook API yet: every alert
//! is logged and reported as undelivered.

use async_trait::async_trait;
use leasewarden_core::traits::SideChannel;

pub struct DiscordChannel {
    webhook_url: String,
}

impl DiscordChannel {
    pub fn new(webhook_url: &str) -> Self {
        Self {
            webhook_url: webhook_url.to_string(),
        }
    }
}

#[async_trait]
impl SideChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, message: &str) -> bool {
        tracing::warn!(
            "⚠️ Discord alerts are not implemented (webhook configured: {}), dropping: {}",
            !self.webhook_url.is_empty(),
            message
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_reports_undelivered() {
        let ch = DiscordChannel::new("https://discord.example/webhook");
        assert_eq!(ch.name(), "discord");
        assert!(!ch.send("hello").await);
    }
}
