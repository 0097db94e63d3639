//! # LeaseWarden Channels
//! Concrete implementations of the collaborator traits in `leasewarden-core`.

pub mod control_plane;
pub mod discord;
pub mod email;
pub mod telegram;
pub mod templates;
pub mod version_source;

pub use control_plane::HttpControlPlane;
pub use discord::DiscordChannel;
pub use email::SmtpTransport;
pub use telegram::TelegramChannel;
pub use templates::HtmlTemplates;
pub use version_source::HttpVersionSource;

use leasewarden_core::config::SideChannelConfig;
use leasewarden_core::traits::SideChannel;

/// Build the configured alert channel, if any.
pub fn side_channel_from_config(config: &SideChannelConfig) -> Option<Box<dyn SideChannel>> {
    match config.provider.as_str() {
        "telegram" if !config.bot_token.is_empty() && !config.chat_id.is_empty() => Some(Box::new(
            TelegramChannel::new(&config.bot_token, &config.chat_id),
        )),
        "telegram" => {
            tracing::warn!("⚠️ Telegram alerts enabled but bot_token/chat_id missing");
            None
        }
        "discord" => Some(Box::new(DiscordChannel::new(&config.webhook_url))),
        "none" | "" => None,
        other => {
            tracing::warn!("⚠️ Unknown side-channel provider '{other}'");
            None
        }
    }
}
