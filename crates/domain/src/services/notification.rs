//! Outbound participant notifications.
//!
//! Delivery is best-effort: callers log a failed send and carry on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Notification type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TrialStarted,
    CancellationScheduled,
    RegistrationInvite,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::TrialStarted => write!(f, "trial_started"),
            NotificationKind::CancellationScheduled => write!(f, "cancellation_scheduled"),
            NotificationKind::RegistrationInvite => write!(f, "registration_invite"),
        }
    }
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    pub kind: NotificationKind,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl NotificationMessage {
    pub fn trial_started(to: &str, trial_ends_at: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::TrialStarted,
            to: to.to_string(),
            subject: "Your Pro trial has started".to_string(),
            body: format!(
                "Your Pro trial is active until {}.",
                trial_ends_at.format("%Y-%m-%d %H:%M UTC")
            ),
        }
    }

    pub fn cancellation_scheduled(to: &str, cancel_at: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::CancellationScheduled,
            to: to.to_string(),
            subject: "Your subscription will end".to_string(),
            body: format!(
                "Your subscription stays active until {} and will not renew.",
                cancel_at.format("%Y-%m-%d")
            ),
        }
    }

    pub fn registration_invite(to: &str, edition_name: &str, claim_url: &str) -> Self {
        Self {
            kind: NotificationKind::RegistrationInvite,
            to: to.to_string(),
            subject: format!("You have been registered for {}", edition_name),
            body: format!(
                "A spot for {} is reserved for you. Claim it here: {}",
                edition_name, claim_url
            ),
        }
    }
}

/// Result of a notification send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    Sent,
    /// Sending failed; never propagated to the command that triggered it.
    Failed(String),
    /// Delivery is disabled.
    Skipped,
}

/// Delivery channel for participant notifications.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: NotificationMessage) -> NotificationResult;
}

/// In-memory notifier for development and tests. Records every message.
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    sent: Arc<Mutex<Vec<NotificationMessage>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    /// Messages accepted so far (including ones that "failed").
    pub fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self, kind: NotificationKind) -> usize {
        self.sent().iter().filter(|m| m.kind == kind).count()
    }
}

#[async_trait::async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, message: NotificationMessage) -> NotificationResult {
        tracing::info!(
            kind = %message.kind,
            to = %message.to,
            "Mock: Would send notification"
        );
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message);
        }
        if self.simulate_failure {
            return NotificationResult::Failed("Simulated failure".to_string());
        }
        NotificationResult::Sent
    }
}
