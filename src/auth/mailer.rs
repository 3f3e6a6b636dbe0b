//! Verification-mail delivery.
//!
//! The engine only sees the [`Mailer`] trait. Production uses SMTP via
//! `lettre`; local development falls back to a sender that logs the message
//! instead of delivering it. Retries are an infrastructure concern and do not
//! live here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

/// Mail delivery abstraction used by the auth engine.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message or return an error; the caller decides what a
    /// failed delivery means for its own state.
    async fn send(&self, to: &str, subject: &str, body_html: &str) -> Result<()>;
}

/// SMTP settings for the real sender.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: SecretString,
    pub from: String,
}

/// STARTTLS SMTP sender; the transport holds a pooled connection set and is
/// the only shared mutable resource owned by mail delivery.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    /// Build the pooled transport from config.
    ///
    /// # Errors
    /// Returns an error if the relay host cannot be resolved into a transport.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .with_context(|| format!("invalid SMTP relay host: {}", config.host))?
            .credentials(credentials)
            .build();
        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body_html: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.parse().context("invalid sender address")?)
            .to(to.parse().context("invalid recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body_html.to_string())
            .context("failed to build mail message")?;

        self.transport
            .send(message)
            .await
            .context("SMTP delivery failed")?;
        Ok(())
    }
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body_html: &str) -> Result<()> {
        info!(to, subject, body = body_html, "mail send stub");
        Ok(())
    }
}

/// Render the one-time-code message body.
#[must_use]
pub fn render_code_email(code: &str, ttl_minutes: i64) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Email Verification</h2>
  <p>Your verification code is:</p>
  <div style="background-color: #f4f4f4; padding: 20px; text-align: center; font-size: 24px; font-weight: bold; margin: 20px 0;">
    {code}
  </div>
  <p>This code will expire in {ttl_minutes} minutes.</p>
  <p>If you didn't request this, please ignore this email.</p>
</div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let mailer = LogMailer;
        let sent = mailer
            .send("alice@pec.edu.in", "Verification", "<p>123456</p>")
            .await;
        assert!(sent.is_ok());
    }

    #[test]
    fn rendered_body_contains_code_and_ttl() {
        let body = render_code_email("042137", 10);
        assert!(body.contains("042137"));
        assert!(body.contains("10 minutes"));
    }
}
