//! Audit log domain models.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Audited actions, rendered as `resource.operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Registrations
    RegistrationConfirm,

    // Group batches
    GroupBatchProcess,
    GroupBatchFail,

    // Invites
    InviteIssue,
    InviteClaim,

    // Billing
    TrialStart,
    PromotionRedeem,
    PromotionCreate,
    GrantCreate,
    GrantClaim,
    SubscriptionCancelSchedule,
    SubscriptionResume,

    // Users
    UserEmailVerify,
    UserPurgeUnverified,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegistrationConfirm => "registration.confirm",
            Self::GroupBatchProcess => "group_batch.process",
            Self::GroupBatchFail => "group_batch.fail",
            Self::InviteIssue => "invite.issue",
            Self::InviteClaim => "invite.claim",
            Self::TrialStart => "billing.trial_start",
            Self::PromotionRedeem => "billing.promotion_redeem",
            Self::PromotionCreate => "billing.promotion_create",
            Self::GrantCreate => "billing.grant_create",
            Self::GrantClaim => "billing.grant_claim",
            Self::SubscriptionCancelSchedule => "billing.cancel_schedule",
            Self::SubscriptionResume => "billing.resume",
            Self::UserEmailVerify => "user.email_verify",
            Self::UserPurgeUnverified => "user.purge_unverified",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who performed an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }
}

/// Input for a new audit log row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateAuditLogInput {
    pub actor_id: Option<Uuid>,
    pub actor_type: ActorType,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub metadata: Option<JsonValue>,
    pub request_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_strings() {
        assert_eq!(AuditAction::TrialStart.as_str(), "billing.trial_start");
        assert_eq!(AuditAction::GroupBatchProcess.to_string(), "group_batch.process");
        assert_eq!(AuditAction::UserEmailVerify.as_str(), "user.email_verify");
    }
}
