//! Built-in HTML reminder templates.

use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::traits::side_channel::escape_html;
use leasewarden_core::traits::{ReminderContext, RenderedMessage, TemplateRenderer};
use leasewarden_core::types::ReminderKind;

/// Plain inline-styled HTML mails.
#[derive(Debug, Clone)]
pub struct HtmlTemplates {
    /// Link shown in the mail footer ("renew here").
    pub dashboard_url: String,
}

impl Default for HtmlTemplates {
    fn default() -> Self {
        Self {
            dashboard_url: "https://localhost/dashboard".into(),
        }
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

impl TemplateRenderer for HtmlTemplates {
    fn render(&self, ctx: &ReminderContext<'_>) -> Result<RenderedMessage> {
        let name = ctx.resource.name.trim();
        if name.is_empty() {
            return Err(LeaseError::Render(format!(
                "resource {} has no name",
                ctx.resource.id
            )));
        }
        let name = escape_html(name);
        let expires = ctx.expires_at.format(DATE_FORMAT);
        let deletes = ctx.delete_at.format(DATE_FORMAT);

        let (subject, headline, detail) = match ctx.kind {
            ReminderKind::ExpiresIn1Day | ReminderKind::ExpiresIn7Days => (
                format!("Your server {} expires in {} day(s)", ctx.resource.name.trim(), ctx.kind.lead_days()),
                format!("Your server <b>{name}</b> expires on {expires}."),
                format!("If you do not renew, it will be suspended and deleted on {deletes}."),
            ),
            ReminderKind::DeletesIn1Day | ReminderKind::DeletesIn7Days => (
                format!("Your server {} will be deleted in {} day(s)", ctx.resource.name.trim(), ctx.kind.lead_days()),
                format!("Your server <b>{name}</b> expired on {expires} and is suspended."),
                format!("It will be permanently deleted, including all data, on {deletes}."),
            ),
        };

        let html = format!(
            "<html><body style=\"font-family:sans-serif\">\
             <h2>{headline}</h2>\
             <p>{detail}</p>\
             <p><a href=\"{url}\">Renew your server</a></p>\
             </body></html>",
            url = escape_html(&self.dashboard_url),
        );
        Ok(RenderedMessage { subject, html })
    }
}
