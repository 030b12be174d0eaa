//! Email delivery for participant notifications.
//!
//! Supports two providers:
//! - `console`: logs emails (development)
//! - `sendgrid`: uses the SendGrid v3 API
//!
//! Delivery is best-effort. [`EmailService`] implements [`Notifier`], whose
//! result is only logged by callers.

use async_trait::async_trait;
use domain::services::{NotificationMessage, NotificationResult, Notifier};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::EmailConfig;

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

/// Errors that can occur during email operations.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email service not configured")]
    NotConfigured,

    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// Email service for transactional participant emails.
#[derive(Clone)]
pub struct EmailService {
    config: Arc<EmailConfig>,
    client: reqwest::Client,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config: Arc::new(config),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Sends one message through the configured provider.
    pub async fn deliver(&self, message: &NotificationMessage) -> Result<(), EmailError> {
        match self.config.provider.as_str() {
            "console" => {
                self.send_console(message);
                Ok(())
            }
            "sendgrid" => self.send_sendgrid(message).await,
            provider => {
                error!(provider = %provider, "Unknown email provider");
                Err(EmailError::NotConfigured)
            }
        }
    }

    fn send_console(&self, message: &NotificationMessage) {
        info!(
            kind = %message.kind,
            to = %message.to,
            subject = %message.subject,
            from = %self.config.sender_email,
            "Email (console provider)"
        );
        debug!(body = %message.body, "Email body");
    }

    fn sendgrid_body(&self, message: &NotificationMessage) -> serde_json::Value {
        serde_json::json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": {
                "email": self.config.sender_email,
                "name": self.config.sender_name
            },
            "subject": message.subject,
            "content": [{ "type": "text/plain", "value": message.body }]
        })
    }

    async fn send_sendgrid(&self, message: &NotificationMessage) -> Result<(), EmailError> {
        if self.config.sendgrid_api_key.is_empty() {
            return Err(EmailError::NotConfigured);
        }

        let response = self
            .client
            .post(SENDGRID_ENDPOINT)
            .bearer_auth(&self.config.sendgrid_api_key)
            .json(&self.sendgrid_body(message))
            .send()
            .await
            .map_err(|e| EmailError::SendFailed(format!("SendGrid request failed: {}", e)))?;

        if response.status().is_success() {
            info!(to = %message.to, kind = %message.kind, "Email sent via SendGrid");
            Ok(())
        } else {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            Err(EmailError::ProviderError(format!(
                "SendGrid returned {}: {}",
                status, error_body
            )))
        }
    }
}

#[async_trait]
impl Notifier for EmailService {
    async fn send(&self, message: NotificationMessage) -> NotificationResult {
        if !self.config.enabled {
            debug!(to = %message.to, kind = %message.kind, "Email disabled, skipping send");
            return NotificationResult::Skipped;
        }
        match self.deliver(&message).await {
            Ok(()) => NotificationResult::Sent,
            Err(e) => {
                warn!(to = %message.to, kind = %message.kind, error = %e, "Email delivery failed");
                NotificationResult::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_config() -> EmailConfig {
        EmailConfig {
            enabled: true,
            provider: "console".to_string(),
            sendgrid_api_key: String::new(),
            sender_email: "races@example.com".to_string(),
            sender_name: "Races".to_string(),
        }
    }

    #[tokio::test]
    async fn test_console_provider_sends() {
        let service = EmailService::new(test_config());
        let result = service
            .send(NotificationMessage::trial_started("a@example.com", Utc::now()))
            .await;
        assert_eq!(result, NotificationResult::Sent);
    }

    #[tokio::test]
    async fn test_disabled_is_skipped() {
        let mut config = test_config();
        config.enabled = false;
        let service = EmailService::new(config);
        let result = service
            .send(NotificationMessage::cancellation_scheduled("a@example.com", Utc::now()))
            .await;
        assert_eq!(result, NotificationResult::Skipped);
    }

    #[tokio::test]
    async fn test_sendgrid_without_key_fails_softly() {
        let mut config = test_config();
        config.provider = "sendgrid".to_string();
        let service = EmailService::new(config);
        let result = service
            .send(NotificationMessage::trial_started("a@example.com", Utc::now()))
            .await;
        assert!(matches!(result, NotificationResult::Failed(_)));
    }

    #[test]
    fn test_sendgrid_body_shape() {
        let service = EmailService::new(test_config());
        let msg = NotificationMessage::registration_invite(
            "runner@example.com",
            "Harbor Half",
            "https://x.test/claim?token=t",
        );
        let body = service.sendgrid_body(&msg);
        assert_eq!(body["personalizations"][0]["to"][0]["email"], "runner@example.com");
        assert_eq!(body["from"]["email"], "races@example.com");
        assert!(body["content"][0]["value"]
            .as_str()
            .unwrap()
            .contains("token=t"));
    }
}
