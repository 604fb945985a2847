//! SMTP delivery gateway (async lettre).

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reminder_core::config::MailConfig;
use reminder_core::traits::DeliveryGateway;
use reminder_core::types::DeliveryResult;

use crate::profile::{self, ResolvedProfile};

/// Plain-text part for clients that do not render HTML.
pub const PLAIN_TEXT_FALLBACK: &str = "您的体力已达到提醒阈值，请及时上线使用体力。";

/// Sends mail through the `smtp` or `qq` profile of a [`MailConfig`].
pub struct SmtpGateway {
    config: MailConfig,
}

impl SmtpGateway {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    /// Name of the profile selected in config.
    pub fn default_profile(&self) -> &str {
        &self.config.provider
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs.max(1))
    }

    async fn deliver(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        profile_name: &str,
    ) -> Result<(), String> {
        let profile = profile::resolve(profile_name, &self.config)?;
        let message = build_message(&profile, recipient, subject, body)?;

        let creds = Credentials::new(profile.user.clone(), profile.password.clone());
        let builder = if profile.use_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&profile.host)
                .map_err(|e| format!("SMTP relay: {e}"))?
        } else if profile.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&profile.host)
                .map_err(|e| format!("SMTP relay: {e}"))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&profile.host)
        };
        let mailer = builder
            .port(profile.port)
            .credentials(creds)
            .timeout(Some(self.timeout()))
            .build();

        mailer
            .send(message)
            .await
            .map_err(|e| format!("SMTP send: {e}"))?;
        Ok(())
    }
}

/// Assemble the outgoing message: plain-text fallback plus the HTML body.
pub fn build_message(
    profile: &ResolvedProfile,
    recipient: &str,
    subject: &str,
    html: &str,
) -> Result<Message, String> {
    let sender: Address = profile
        .sender
        .parse()
        .map_err(|e| format!("Invalid from: {e}"))?;
    let from = Mailbox::new(profile.sender_name.clone(), sender);
    let to: Mailbox = recipient
        .trim()
        .parse()
        .map_err(|e| format!("Invalid to: {e}"))?;

    let builder = Message::builder().from(from).to(to).subject(subject);
    let message = if html.is_empty() {
        builder
            .header(ContentType::TEXT_PLAIN)
            .body(PLAIN_TEXT_FALLBACK.to_string())
    } else {
        builder.multipart(MultiPart::alternative_plain_html(
            PLAIN_TEXT_FALLBACK.to_string(),
            html.to_string(),
        ))
    };
    message.map_err(|e| format!("Build email: {e}"))
}

#[async_trait]
impl DeliveryGateway for SmtpGateway {
    async fn send(&self, recipient: &str, subject: &str, body: &str, profile: &str) -> DeliveryResult {
        match self.deliver(recipient, subject, body, profile).await {
            Ok(()) => {
                tracing::info!("📤 Email sent to: {recipient}");
                DeliveryResult::ok()
            }
            Err(e) => {
                tracing::warn!("📭 Email to {recipient} failed: {e}");
                DeliveryResult::failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reminder_core::config::MailProfile;

    fn resolved() -> ResolvedProfile {
        ResolvedProfile {
            host: "smtp.example.com".into(),
            port: 465,
            user: "bot@example.com".into(),
            password: "pw".into(),
            sender: "bot@example.com".into(),
            sender_name: Some("Rover Reminder".into()),
            use_ssl: true,
            starttls: false,
        }
    }

    #[test]
    fn test_message_is_multipart_alternative() {
        let msg = build_message(&resolved(), "user@example.com", "Stamina", "<b>full</b>").unwrap();
        let raw = String::from_utf8_lossy(&msg.formatted()).to_string();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
        assert!(raw.contains("Rover Reminder"));
    }

    #[test]
    fn test_empty_html_sends_plain_only() {
        let msg = build_message(&resolved(), "user@example.com", "Stamina", "").unwrap();
        let raw = String::from_utf8_lossy(&msg.formatted()).to_string();
        assert!(!raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
    }

    #[test]
    fn test_bad_recipient() {
        let err = build_message(&resolved(), "not-an-address", "s", "b").unwrap_err();
        assert!(err.starts_with("Invalid to"));
    }

    #[tokio::test]
    async fn test_unknown_profile_is_reported_not_raised() {
        let gateway = SmtpGateway::new(MailConfig::default());
        let result = gateway.send("user@example.com", "s", "b", "carrier-pigeon").await;
        assert!(!result.ok);
        assert!(result.detail.contains("unknown mail profile"));
    }

    #[tokio::test]
    async fn test_incomplete_profile_is_reported() {
        let config = MailConfig {
            smtp: MailProfile {
                host: Some("smtp.example.com".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let gateway = SmtpGateway::new(config);
        let result = gateway.send("user@example.com", "s", "b", "smtp").await;
        assert!(!result.ok);
        assert!(result.detail.contains("incomplete"));
    }

    #[test]
    fn test_default_profile_follows_provider() {
        assert_eq!(SmtpGateway::new(MailConfig::default()).default_profile(), "smtp");
        let config = MailConfig {
            provider: "qq".into(),
            ..Default::default()
        };
        assert_eq!(SmtpGateway::new(config).default_profile(), "qq");
    }
}
