//! SMTP mail transport (async lettre).

use async_trait::async_trait;
use leasewarden_core::config::SmtpConfig;
use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::traits::MailTransport;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Sends reminder mails through a STARTTLS relay.
pub struct SmtpTransport {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| LeaseError::Mail(format!("Invalid from: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| LeaseError::Mail(format!("SMTP relay: {e}")))?
            .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            from,
            mailer: builder.build(),
        })
    }
}

/// Assemble an HTML message.
pub(crate) fn build_message(from: &Mailbox, to: &str, subject: &str, html: &str) -> Result<Message> {
    let to_mailbox: Mailbox = to
        .parse()
        .map_err(|e| LeaseError::Mail(format!("Invalid to '{to}': {e}")))?;

    Message::builder()
        .from(from.clone())
        .to(to_mailbox)
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(html.to_string())
        .map_err(|e| LeaseError::Mail(format!("Build email: {e}")))
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<String> {
        let email = build_message(&self.from, to, subject, html)?;
        let response = self
            .mailer
            .send(email)
            .await
            .map_err(|e| LeaseError::Mail(format!("SMTP send: {e}")))?;

        let text = format!(
            "{} {}",
            response.code(),
            response.message().collect::<Vec<_>>().join(" ")
        );
        tracing::info!("📤 Email sent to: {to}");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let from: Mailbox = "LeaseWarden <noreply@example.com>".parse().unwrap();
        assert!(build_message(&from, "not an address", "s", "<p>x</p>").is_err());
        assert!(build_message(&from, "owner@example.com", "s", "<p>x</p>").is_ok());
    }

    #[test]
    fn test_new_rejects_bad_from() {
        let cfg = SmtpConfig {
            from: "???".into(),
            ..Default::default()
        };
        assert!(matches!(SmtpTransport::new(&cfg), Err(LeaseError::Mail(_))));
    }
}
