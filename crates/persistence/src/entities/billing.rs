//! Billing and entitlement entities.

use chrono::{DateTime, Utc};
use domain::models::{
    BillingPromotion, BillingSubscription, EntitlementOverride, OverrideSourceType,
    PendingEntitlementGrant, SubscriptionStatus,
};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct BillingSubscriptionEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BillingSubscriptionEntity> for BillingSubscription {
    fn from(entity: BillingSubscriptionEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            // Unknown statuses grant nothing.
            status: entity.status.parse().unwrap_or(SubscriptionStatus::Ended),
            current_period_start: entity.current_period_start,
            current_period_end: entity.current_period_end,
            cancel_at_period_end: entity.cancel_at_period_end,
            canceled_at: entity.canceled_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TrialUseEntity {
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub trial_ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct BillingPromotionEntity {
    pub id: Uuid,
    pub code: String,
    pub grant_days: i32,
    pub max_redemptions: Option<i32>,
    pub redemption_count: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl From<BillingPromotionEntity> for BillingPromotion {
    fn from(entity: BillingPromotionEntity) -> Self {
        Self {
            id: entity.id,
            code: entity.code,
            grant_days: entity.grant_days,
            max_redemptions: entity.max_redemptions,
            redemption_count: entity.redemption_count,
            starts_at: entity.starts_at,
            ends_at: entity.ends_at,
            is_active: entity.is_active,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PromotionRedemptionEntity {
    pub id: Uuid,
    pub promotion_id: Uuid,
    pub user_id: Uuid,
    pub override_id: Option<Uuid>,
    pub redeemed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EntitlementOverrideEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_type: String,
    pub source_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<EntitlementOverrideEntity> for EntitlementOverride {
    fn from(entity: EntitlementOverrideEntity) -> Self {
        // An unrecognised source still grants as a plain override.
        let source_type = entity
            .source_type
            .parse()
            .unwrap_or(OverrideSourceType::Admin);
        Self {
            id: entity.id,
            user_id: entity.user_id,
            source_type,
            starts_at: entity.starts_at,
            ends_at: entity.ends_at,
            revoked_at: entity.revoked_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PendingGrantEntity {
    pub id: Uuid,
    pub email: String,
    pub grant_days: i32,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<Uuid>,
    pub claim_source: Option<String>,
    pub override_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<PendingGrantEntity> for PendingEntitlementGrant {
    fn from(entity: PendingGrantEntity) -> Self {
        Self {
            id: entity.id,
            email: entity.email,
            grant_days: entity.grant_days,
            claimed_at: entity.claimed_at,
            claimed_by: entity.claimed_by,
            claim_source: entity.claim_source,
            created_at: entity.created_at,
        }
    }
}
