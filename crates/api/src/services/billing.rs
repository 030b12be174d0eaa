//! Billing commands and Pro entitlement reads.
//!
//! Every one-time command here is decided by the database: a unique
//! constraint or a guarded update picks the single winner, and losers get an
//! idempotent answer instead of an error.

use chrono::{DateTime, Duration, Utc};
use domain::models::{
    AuditAction, BillingPromotion, BillingSubscription, ClaimGrantsResult,
    CreatePendingGrantRequest, CreatePromotionRequest, EntitlementInterval, EntitlementOverride,
    OverrideSourceType, PendingEntitlementGrant, ProEntitlement, RedeemPromotionResult,
    ResumeSubscriptionResult, ScheduleCancelResult, StartTrialResult, PERMISSION_BILLING_ADMIN,
};
use domain::services::{
    evaluate_pro_entitlement, evaluate_pro_feature, AuditLogBuilder, NotificationMessage,
    Notifier, ProFeatureConfig, ProFeatureDecision,
};
use domain::{DomainError, ErrorCode};
use persistence::db::is_unique_violation;
use persistence::repositories::{AuditLogRepository, BillingRepository, UserRepository};
use shared::validation::{normalize_email, normalize_promo_code, validate_promo_code};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{notify_best_effort, validate_input, CommandContext, ServiceError, ServiceResult};
use crate::middleware::metrics::record_billing_command;

/// Billing knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct BillingSettings {
    pub trial_days: i64,
    pub pending_grant_default_days: i32,
    pub pro_features: HashMap<String, ProFeatureConfig>,
}

#[derive(Clone)]
pub struct BillingService {
    pool: PgPool,
    notifier: Arc<dyn Notifier>,
    settings: Arc<BillingSettings>,
}

impl BillingService {
    pub fn new(pool: PgPool, notifier: Arc<dyn Notifier>, settings: BillingSettings) -> Self {
        Self {
            pool,
            notifier,
            settings: Arc::new(settings),
        }
    }

    /// Current Pro status from the subscription period and live overrides.
    pub async fn get_pro_status(
        &self,
        ctx: &CommandContext,
        now: DateTime<Utc>,
    ) -> ServiceResult<ProEntitlement> {
        let intervals = self.load_intervals(ctx.user_id(), now).await?;
        Ok(evaluate_pro_entitlement(now, ctx.auth.is_internal, &intervals))
    }

    pub async fn feature_decision(
        &self,
        ctx: &CommandContext,
        feature_key: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<ProFeatureDecision> {
        let config = self
            .settings
            .pro_features
            .get(feature_key)
            .copied()
            .unwrap_or_default();
        let status = self.get_pro_status(ctx, now).await?;
        Ok(evaluate_pro_feature(&config, status.is_pro, ctx.auth.is_internal))
    }

    /// Starts the one trial a user ever gets.
    pub async fn start_trial(
        &self,
        ctx: &CommandContext,
        now: DateTime<Utc>,
    ) -> ServiceResult<StartTrialResult> {
        let user_id = ctx.user_id();
        let email = self.user_email(user_id).await?;
        let trial_ends_at = now + Duration::days(self.settings.trial_days);

        let mut tx = self.pool.begin().await?;
        let Some(trial) = BillingRepository::insert_trial_use(&mut tx, user_id, trial_ends_at).await?
        else {
            tx.rollback().await?;
            let existing = BillingRepository::find_trial_use(&self.pool, user_id).await?;
            record_billing_command("start_trial", "already_started");
            return Ok(StartTrialResult {
                already_started: true,
                trial_ends_at: existing.map(|t| t.trial_ends_at),
            });
        };

        if BillingRepository::upsert_trial_subscription(&mut tx, user_id, now, trial.trial_ends_at)
            .await?
            .is_none()
        {
            tx.rollback().await?;
            record_billing_command("start_trial", "rejected");
            return Err(DomainError::invalid_state("a subscription is already active").into());
        }

        let entry = AuditLogBuilder::user_action(user_id, AuditAction::TrialStart)
            .on_resource("user", user_id)
            .with_metadata("trialEndsAt", trial.trial_ends_at.to_rfc3339())
            .with_request_id(ctx.request_id.clone())
            .build();
        AuditLogRepository::insert(&mut tx, &entry).await?;
        tx.commit().await?;

        record_billing_command("start_trial", "applied");
        tracing::info!(user_id = %user_id, trial_ends_at = %trial.trial_ends_at, "Trial started");
        notify_best_effort(
            self.notifier.as_ref(),
            NotificationMessage::trial_started(&email, trial.trial_ends_at),
        )
        .await;

        Ok(StartTrialResult {
            already_started: false,
            trial_ends_at: Some(trial.trial_ends_at),
        })
    }

    /// Redeems a promotion code once per user, within the promotion's cap.
    pub async fn redeem_promotion(
        &self,
        ctx: &CommandContext,
        code: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<RedeemPromotionResult> {
        let user_id = ctx.user_id();
        let code = normalize_promo_code(code);
        if validate_promo_code(&code).is_err() {
            return Err(promotion_unavailable().into());
        }

        let mut tx = self.pool.begin().await?;
        let promotion: BillingPromotion =
            BillingRepository::find_promotion_by_code(&mut *tx, &code)
                .await?
                .map(BillingPromotion::from)
                .filter(|p| p.is_redeemable_at(now))
                .ok_or_else(promotion_unavailable)?;

        let Some(redemption_id) =
            BillingRepository::insert_redemption(&mut tx, promotion.id, user_id).await?
        else {
            tx.rollback().await?;
            record_billing_command("redeem_promotion", "already_redeemed");
            let status = self.get_pro_status(ctx, now).await?;
            return Ok(RedeemPromotionResult {
                already_redeemed: true,
                pro_until: status.pro_until,
            });
        };

        if !BillingRepository::increment_redemption_count(&mut tx, promotion.id).await? {
            tx.rollback().await?;
            record_billing_command("redeem_promotion", "cap_reached");
            return Err(DomainError::new(
                ErrorCode::PromotionCapReached,
                "promotion has no redemptions left",
            )
            .into());
        }

        let grant = BillingRepository::insert_override(
            &mut tx,
            user_id,
            OverrideSourceType::Promotion,
            Some(promotion.id),
            now,
            now + Duration::days(i64::from(promotion.grant_days)),
        )
        .await?;
        BillingRepository::link_redemption_override(&mut tx, redemption_id, grant.id).await?;

        let entry = AuditLogBuilder::user_action(user_id, AuditAction::PromotionRedeem)
            .on_resource("billing_promotion", promotion.id)
            .with_metadata("code", promotion.code.clone())
            .with_metadata("grantDays", promotion.grant_days)
            .with_request_id(ctx.request_id.clone())
            .build();
        AuditLogRepository::insert(&mut tx, &entry).await?;
        tx.commit().await?;

        record_billing_command("redeem_promotion", "applied");
        tracing::info!(user_id = %user_id, promotion_id = %promotion.id, "Promotion redeemed");

        let status = self.get_pro_status(ctx, now).await?;
        Ok(RedeemPromotionResult {
            already_redeemed: false,
            pro_until: status.pro_until,
        })
    }

    /// Claims every unclaimed grant addressed to the caller's verified email.
    pub async fn claim_pending_grants(
        &self,
        ctx: &CommandContext,
        claim_source: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<ClaimGrantsResult> {
        let user_id = ctx.user_id();
        let user = UserRepository::find_by_id(&self.pool, user_id)
            .await?
            .filter(|u| u.is_active())
            .ok_or_else(|| DomainError::not_found("user not found"))?;
        if !user.email_verified {
            return Err(DomainError::forbidden("email address is not verified").into());
        }

        let mut tx = self.pool.begin().await?;
        let grants =
            BillingRepository::claim_pending_grants(&mut tx, &user.email, user_id, claim_source)
                .await?;

        let mut result = ClaimGrantsResult::default();
        for grant in &grants {
            let created = BillingRepository::insert_override(
                &mut tx,
                user_id,
                OverrideSourceType::PendingGrant,
                Some(grant.id),
                now,
                now + Duration::days(i64::from(grant.grant_days)),
            )
            .await?;
            BillingRepository::link_grant_override(&mut tx, grant.id, created.id).await?;
            result.claimed_count += 1;
            result.overrides_created += 1;
        }

        if !grants.is_empty() {
            let entry = AuditLogBuilder::user_action(user_id, AuditAction::GrantClaim)
                .on_resource("user", user_id)
                .with_metadata("claimedCount", result.claimed_count)
                .with_metadata("claimSource", claim_source)
                .with_request_id(ctx.request_id.clone())
                .build();
            AuditLogRepository::insert(&mut tx, &entry).await?;
        }
        tx.commit().await?;

        let outcome = if grants.is_empty() { "none" } else { "applied" };
        record_billing_command("claim_pending_grants", outcome);
        tracing::info!(user_id = %user_id, claimed = result.claimed_count, "Pending grants claimed");
        Ok(result)
    }

    /// Schedules the subscription to end at its period end.
    pub async fn schedule_cancel(
        &self,
        ctx: &CommandContext,
        now: DateTime<Utc>,
    ) -> ServiceResult<ScheduleCancelResult> {
        let user_id = ctx.user_id();
        let mut tx = self.pool.begin().await?;

        if let Some(updated) = BillingRepository::schedule_cancel(&mut tx, user_id, now).await? {
            let subscription = BillingSubscription::from(updated);
            let entry =
                AuditLogBuilder::user_action(user_id, AuditAction::SubscriptionCancelSchedule)
                    .on_resource("billing_subscription", subscription.id)
                    .with_metadata("cancelAt", subscription.current_period_end.to_rfc3339())
                    .with_request_id(ctx.request_id.clone())
                    .build();
            AuditLogRepository::insert(&mut tx, &entry).await?;
            tx.commit().await?;

            record_billing_command("schedule_cancel", "applied");
            tracing::info!(user_id = %user_id, "Subscription cancellation scheduled");
            if let Ok(email) = self.user_email(user_id).await {
                notify_best_effort(
                    self.notifier.as_ref(),
                    NotificationMessage::cancellation_scheduled(
                        &email,
                        subscription.current_period_end,
                    ),
                )
                .await;
            }
            return Ok(ScheduleCancelResult {
                already_scheduled: false,
                cancel_at: subscription.current_period_end,
            });
        }

        let current = BillingRepository::find_subscription(&mut *tx, user_id)
            .await?
            .map(BillingSubscription::from);
        tx.rollback().await?;

        match current {
            Some(s) if is_live(&s, now) && s.cancel_at_period_end => {
                record_billing_command("schedule_cancel", "already_scheduled");
                Ok(ScheduleCancelResult {
                    already_scheduled: true,
                    cancel_at: s.current_period_end,
                })
            }
            _ => {
                record_billing_command("schedule_cancel", "rejected");
                Err(no_active_subscription().into())
            }
        }
    }

    /// Undoes a scheduled cancellation while the period is still running.
    pub async fn resume_subscription(
        &self,
        ctx: &CommandContext,
        now: DateTime<Utc>,
    ) -> ServiceResult<ResumeSubscriptionResult> {
        let user_id = ctx.user_id();
        let mut tx = self.pool.begin().await?;

        if let Some(updated) = BillingRepository::resume(&mut tx, user_id, now).await? {
            let entry = AuditLogBuilder::user_action(user_id, AuditAction::SubscriptionResume)
                .on_resource("billing_subscription", updated.id)
                .with_request_id(ctx.request_id.clone())
                .build();
            AuditLogRepository::insert(&mut tx, &entry).await?;
            tx.commit().await?;

            record_billing_command("resume", "applied");
            tracing::info!(user_id = %user_id, "Subscription resumed");
            return Ok(ResumeSubscriptionResult {
                already_active: false,
            });
        }

        let current = BillingRepository::find_subscription(&mut *tx, user_id)
            .await?
            .map(BillingSubscription::from);
        tx.rollback().await?;

        match current {
            Some(s) if is_live(&s, now) && !s.cancel_at_period_end => {
                record_billing_command("resume", "already_active");
                Ok(ResumeSubscriptionResult {
                    already_active: true,
                })
            }
            _ => {
                record_billing_command("resume", "rejected");
                Err(no_active_subscription().into())
            }
        }
    }

    pub async fn create_promotion(
        &self,
        ctx: &CommandContext,
        request: CreatePromotionRequest,
    ) -> ServiceResult<BillingPromotion> {
        ctx.require_permission(PERMISSION_BILLING_ADMIN)?;
        validate_input(&request)?;
        let code = normalize_promo_code(&request.code);
        validate_promo_code(&code).map_err(|e| {
            DomainError::validation(
                e.message
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "invalid promotion code".to_string()),
            )
        })?;
        if let (Some(starts), Some(ends)) = (request.starts_at, request.ends_at) {
            if ends <= starts {
                return Err(DomainError::validation("endsAt must be after startsAt").into());
            }
        }

        let promotion: BillingPromotion = BillingRepository::new(self.pool.clone())
            .create_promotion(
                &code,
                request.grant_days,
                request.max_redemptions,
                request.starts_at,
                request.ends_at,
                ctx.user_id(),
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DomainError::invalid_state(format!("promotion code {} already exists", code))
                        .into()
                } else {
                    ServiceError::Database(e)
                }
            })?
            .into();

        self.audit_admin(ctx, AuditAction::PromotionCreate, "billing_promotion", promotion.id)
            .await?;
        tracing::info!(promotion_id = %promotion.id, code = %promotion.code, "Promotion created");
        Ok(promotion)
    }

    pub async fn create_pending_grant(
        &self,
        ctx: &CommandContext,
        request: CreatePendingGrantRequest,
    ) -> ServiceResult<PendingEntitlementGrant> {
        ctx.require_permission(PERMISSION_BILLING_ADMIN)?;
        validate_input(&request)?;
        let grant_days = request
            .grant_days
            .unwrap_or(self.settings.pending_grant_default_days);

        let grant: PendingEntitlementGrant = BillingRepository::new(self.pool.clone())
            .create_pending_grant(&normalize_email(&request.email), grant_days, ctx.user_id())
            .await?
            .into();

        self.audit_admin(ctx, AuditAction::GrantCreate, "billing_pending_grant", grant.id)
            .await?;
        tracing::info!(grant_id = %grant.id, grant_days, "Pending entitlement grant created");
        Ok(grant)
    }

    async fn load_intervals(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> ServiceResult<Vec<EntitlementInterval>> {
        let subscription = BillingRepository::find_subscription(&self.pool, user_id)
            .await?
            .map(BillingSubscription::from);
        let overrides = BillingRepository::list_live_overrides(&self.pool, user_id, now).await?;

        Ok(subscription
            .iter()
            .filter_map(BillingSubscription::interval)
            .chain(
                overrides
                    .into_iter()
                    .map(EntitlementOverride::from)
                    .filter_map(|o| o.interval()),
            )
            .collect())
    }

    async fn user_email(&self, user_id: Uuid) -> ServiceResult<String> {
        UserRepository::find_by_id(&self.pool, user_id)
            .await?
            .filter(|u| u.is_active())
            .map(|u| u.email)
            .ok_or_else(|| DomainError::not_found("user not found").into())
    }

    async fn audit_admin(
        &self,
        ctx: &CommandContext,
        action: AuditAction,
        resource_type: &str,
        resource_id: Uuid,
    ) -> ServiceResult<()> {
        let entry = AuditLogBuilder::user_action(ctx.user_id(), action)
            .on_resource(resource_type, resource_id)
            .with_request_id(ctx.request_id.clone())
            .build();
        let mut conn = self.pool.acquire().await?;
        AuditLogRepository::insert(&mut conn, &entry).await?;
        Ok(())
    }
}

fn is_live(subscription: &BillingSubscription, now: DateTime<Utc>) -> bool {
    subscription.status.grants_access() && subscription.current_period_end > now
}

fn promotion_unavailable() -> DomainError {
    DomainError::new(
        ErrorCode::PromotionUnavailable,
        "promotion code is not available",
    )
}

fn no_active_subscription() -> DomainError {
    DomainError::new(
        ErrorCode::NoActiveSubscription,
        "no active subscription to change",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::SubscriptionStatus;

    fn subscription(status: SubscriptionStatus, ends_in_days: i64) -> BillingSubscription {
        let now = Utc::now();
        BillingSubscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status,
            current_period_start: now - Duration::days(1),
            current_period_end: now + Duration::days(ends_in_days),
            cancel_at_period_end: false,
            canceled_at: None,
        }
    }

    #[test]
    fn test_is_live() {
        let now = Utc::now();
        assert!(is_live(&subscription(SubscriptionStatus::Active, 10), now));
        assert!(is_live(&subscription(SubscriptionStatus::Trialing, 1), now));
        assert!(!is_live(&subscription(SubscriptionStatus::Active, -1), now));
        assert!(!is_live(&subscription(SubscriptionStatus::Canceled, 10), now));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(promotion_unavailable().code, ErrorCode::PromotionUnavailable);
        assert_eq!(
            no_active_subscription().code,
            ErrorCode::NoActiveSubscription
        );
    }
}
