//! Billing and entitlement models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Where a Pro entitlement comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementSource {
    Trial,
    Subscription,
    Promotion,
    Override,
    InternalBypass,
}

impl EntitlementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Subscription => "subscription",
            Self::Promotion => "promotion",
            Self::Override => "override",
            Self::InternalBypass => "internal_bypass",
        }
    }
}

/// A half-open window `[starts_at, ends_at)` during which a source grants Pro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitlementInterval {
    pub source: EntitlementSource,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl EntitlementInterval {
    pub fn new(source: EntitlementSource, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        Self {
            source,
            starts_at,
            ends_at,
        }
    }
}

/// Pro verdict for a user at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProEntitlement {
    pub is_pro: bool,
    pub pro_until: Option<DateTime<Utc>>,
    pub effective_source: Option<EntitlementSource>,
}

impl ProEntitlement {
    pub fn none() -> Self {
        Self {
            is_pro: false,
            pro_until: None,
            effective_source: None,
        }
    }
}

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    Canceled,
    Ended,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::Ended => "ended",
        }
    }

    /// Statuses whose current period grants Pro.
    pub fn grants_access(&self) -> bool {
        matches!(self, Self::Trialing | Self::Active)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trialing" => Ok(Self::Trialing),
            "active" => Ok(Self::Active),
            "canceled" => Ok(Self::Canceled),
            "ended" => Ok(Self::Ended),
            _ => Err(format!("Unknown subscription status: {}", s)),
        }
    }
}

/// A user's subscription (one row per user).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl BillingSubscription {
    pub fn interval(&self) -> Option<EntitlementInterval> {
        if !self.status.grants_access() {
            return None;
        }
        let source = match self.status {
            SubscriptionStatus::Trialing => EntitlementSource::Trial,
            _ => EntitlementSource::Subscription,
        };
        Some(EntitlementInterval::new(
            source,
            self.current_period_start,
            self.current_period_end,
        ))
    }
}

/// What created an entitlement override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideSourceType {
    Promotion,
    PendingGrant,
    Admin,
}

impl OverrideSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Promotion => "promotion",
            Self::PendingGrant => "pending_grant",
            Self::Admin => "admin",
        }
    }

    /// Entitlement source reported for intervals from this override.
    pub fn entitlement_source(&self) -> EntitlementSource {
        match self {
            Self::Promotion => EntitlementSource::Promotion,
            Self::PendingGrant | Self::Admin => EntitlementSource::Override,
        }
    }
}

impl FromStr for OverrideSourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "promotion" => Ok(Self::Promotion),
            "pending_grant" => Ok(Self::PendingGrant),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Unknown override source: {}", s)),
        }
    }
}

/// A time-boxed Pro grant outside the subscription.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementOverride {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_type: OverrideSourceType,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl EntitlementOverride {
    pub fn interval(&self) -> Option<EntitlementInterval> {
        if self.revoked_at.is_some() {
            return None;
        }
        Some(EntitlementInterval::new(
            self.source_type.entitlement_source(),
            self.starts_at,
            self.ends_at,
        ))
    }
}

/// A promotion code granting Pro days.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingPromotion {
    pub id: Uuid,
    pub code: String,
    pub grant_days: i32,
    pub max_redemptions: Option<i32>,
    pub redemption_count: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl BillingPromotion {
    /// Whether the promotion is active and inside its redemption window.
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at.map_or(true, |t| t <= now)
            && self.ends_at.map_or(true, |t| now < t)
    }
}

/// A Pro grant for an email address that may not have an account yet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEntitlementGrant {
    pub id: Uuid,
    pub email: String,
    pub grant_days: i32,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<Uuid>,
    pub claim_source: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of `start_trial`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTrialResult {
    pub already_started: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

/// Result of `redeem_promotion`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemPromotionResult {
    pub already_redeemed: bool,
    pub pro_until: Option<DateTime<Utc>>,
}

/// Result of `claim_pending_grants`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimGrantsResult {
    pub claimed_count: usize,
    pub overrides_created: usize,
}

/// Result of `schedule_cancel_at_period_end`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleCancelResult {
    pub already_scheduled: bool,
    pub cancel_at: DateTime<Utc>,
}

/// Result of `resume_subscription`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeSubscriptionResult {
    pub already_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedeemPromotionRequest {
    pub code: String,
}

/// Admin request to create a promotion.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromotionRequest {
    pub code: String,

    #[validate(range(min = 1, max = 3650, message = "grantDays must be 1-3650"))]
    pub grant_days: i32,

    #[validate(range(min = 1, message = "maxRedemptions must be positive"))]
    pub max_redemptions: Option<i32>,

    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Admin request to create a pending grant.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePendingGrantRequest {
    #[validate(email(message = "email must be a valid email address"))]
    pub email: String,

    #[validate(range(min = 1, max = 3650, message = "grantDays must be 1-3650"))]
    pub grant_days: Option<i32>,
}
