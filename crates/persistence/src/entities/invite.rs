//! Registration invite entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{InviteStatus, RegistrationInvite};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the registration_invites table.
#[derive(Debug, Clone, FromRow)]
pub struct RegistrationInviteEntity {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub registration_id: Uuid,
    pub email: String,
    pub token_hash: String,
    pub status: String,
    pub is_current: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<RegistrationInviteEntity> for RegistrationInvite {
    fn from(entity: RegistrationInviteEntity) -> Self {
        Self {
            id: entity.id,
            edition_id: entity.edition_id,
            registration_id: entity.registration_id,
            email: entity.email,
            status: entity.status.parse().unwrap_or(InviteStatus::Cancelled),
            is_current: entity.is_current,
            sent_at: entity.sent_at,
            claimed_at: entity.claimed_at,
            claimed_by: entity.claimed_by,
            created_at: entity.created_at,
        }
    }
}
