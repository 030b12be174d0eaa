//! Registration invite models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Invite lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Draft,
    Sent,
    Claimed,
    Cancelled,
    Superseded,
    Expired,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Claimed => "claimed",
            Self::Cancelled => "cancelled",
            Self::Superseded => "superseded",
            Self::Expired => "expired",
        }
    }

    /// Whether a token in this status can still be claimed.
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Draft | Self::Sent)
    }
}

impl FromStr for InviteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "claimed" => Ok(Self::Claimed),
            "cancelled" => Ok(Self::Cancelled),
            "superseded" => Ok(Self::Superseded),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Unknown invite status: {}", s)),
        }
    }
}

/// An invitation to claim a pre-created registration.
///
/// Only the SHA-256 hash of the token is stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInvite {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub registration_id: Uuid,
    pub email: String,
    pub status: InviteStatus,
    pub is_current: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Request body for claiming an invite.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimInviteRequest {
    pub token: String,
}

/// Result of a successful claim.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimInviteResult {
    pub invite_id: Uuid,
    pub registration_id: Uuid,
}

/// Result of issuing invites for a processed batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueInvitesResult {
    pub issued: usize,
    pub superseded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claimable_statuses() {
        assert!(InviteStatus::Draft.is_claimable());
        assert!(InviteStatus::Sent.is_claimable());
        assert!(!InviteStatus::Claimed.is_claimable());
        assert!(!InviteStatus::Superseded.is_claimable());
        assert!(!InviteStatus::Expired.is_claimable());
    }

    #[test]
    fn test_invite_status_parse() {
        assert_eq!("superseded".parse::<InviteStatus>().unwrap(), InviteStatus::Superseded);
        assert!("pending".parse::<InviteStatus>().is_err());
    }
}
