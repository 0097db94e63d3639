//! Operational alert channel (Telegram, Discord, ...).

use async_trait::async_trait;

/// Best-effort operator alerts. Implementations never fail: delivery
/// problems are logged and reported as `false`.
#[async_trait]
pub trait SideChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Send an HTML-escaped text message.
    async fn send(&self, message: &str) -> bool;
}

/// Escape text for HTML-formatted chat messages.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
