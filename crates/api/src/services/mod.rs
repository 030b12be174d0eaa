//! Command layer.
//!
//! Each service opens its own transaction, feeds rows to the pure rules in
//! `domain::services` and applies the decision through guarded writes in
//! `persistence`. Expected rule violations come back as
//! [`ServiceError::Domain`]; only infrastructure failures and lost races are
//! anything else.

pub mod billing;
pub mod email;
pub mod group_batches;
pub mod groups;
pub mod invites;
pub mod registrations;
pub mod users;

use domain::models::AuthContext;
use domain::services::{NotificationMessage, NotificationResult, Notifier};
use domain::DomainError;
use thiserror::Error;
use validator::Validate;

pub use billing::BillingService;
pub use email::EmailService;
pub use group_batches::GroupBatchService;
pub use groups::GroupService;
pub use invites::InviteService;
pub use registrations::RegistrationService;
pub use users::UserService;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A guarded update matched no row although the row was locked and
    /// checked beforehand.
    #[error("lost race: {0}")]
    LostRace(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    /// Machine code for logs and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Domain(err) => err.code.as_str(),
            ServiceError::LostRace(_) => "LOST_RACE",
            ServiceError::Database(_) => "DATABASE_ERROR",
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Caller identity plus request correlation for audit entries.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub auth: AuthContext,
    pub request_id: Option<String>,
}

impl CommandContext {
    pub fn new(auth: AuthContext) -> Self {
        Self {
            auth,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn user_id(&self) -> uuid::Uuid {
        self.auth.user_id
    }

    pub fn require_permission(&self, permission: &str) -> Result<(), DomainError> {
        if self.auth.has_permission(permission) {
            Ok(())
        } else {
            Err(DomainError::forbidden(format!(
                "missing permission {}",
                permission
            )))
        }
    }
}

/// Runs `validator` rules and folds the field messages into one domain error.
pub(crate) fn validate_input<T: Validate>(input: &T) -> Result<(), DomainError> {
    input.validate().map_err(|errors| {
        let mut messages: Vec<String> = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string())
            })
            .collect();
        messages.sort();
        DomainError::validation(messages.join("; "))
    })
}

/// Sends a notification after the command committed. Failures are logged only.
pub(crate) async fn notify_best_effort(notifier: &dyn Notifier, message: NotificationMessage) {
    let kind = message.kind;
    match notifier.send(message).await {
        NotificationResult::Sent | NotificationResult::Skipped => {}
        NotificationResult::Failed(reason) => {
            tracing::warn!(kind = %kind, reason = %reason, "Notification delivery failed");
        }
    }
}
