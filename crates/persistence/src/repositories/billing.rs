//! Repository for billing ledgers: subscriptions, trials, promotions,
//! overrides and pending grants.
//!
//! One-time commands race on unique constraints and guarded updates here;
//! callers never read-then-write.

use chrono::{DateTime, Utc};
use domain::models::OverrideSourceType;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::entities::{
    BillingPromotionEntity, BillingSubscriptionEntity, EntitlementOverrideEntity,
    PendingGrantEntity, PromotionRedemptionEntity, TrialUseEntity,
};
use crate::metrics::QueryTimer;

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, user_id, status, current_period_start, current_period_end, cancel_at_period_end,
    canceled_at, created_at, updated_at
"#;

const PROMOTION_COLUMNS: &str =
    "id, code, grant_days, max_redemptions, redemption_count, starts_at, ends_at, is_active";

const OVERRIDE_COLUMNS: &str = "id, user_id, source_type, source_id, starts_at, ends_at, revoked_at";

const GRANT_COLUMNS: &str =
    "id, email, grant_days, claimed_at, claimed_by, claim_source, override_id, created_at";

/// Repository for billing and entitlement rows.
#[derive(Clone)]
pub struct BillingRepository {
    pool: PgPool,
}

impl BillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Trials

    /// Records the user's one trial. `None` means a trial was already recorded.
    pub async fn insert_trial_use(
        conn: &mut PgConnection,
        user_id: Uuid,
        trial_ends_at: DateTime<Utc>,
    ) -> Result<Option<TrialUseEntity>, sqlx::Error> {
        let timer = QueryTimer::new("insert_trial_use");
        let result = sqlx::query_as::<_, TrialUseEntity>(
            r#"
            INSERT INTO billing_trial_uses (user_id, trial_ends_at)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING user_id, started_at, trial_ends_at
            "#,
        )
        .bind(user_id)
        .bind(trial_ends_at)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    pub async fn find_trial_use<'e, E>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Option<TrialUseEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, TrialUseEntity>(
            "SELECT user_id, started_at, trial_ends_at FROM billing_trial_uses WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Creates the trialing subscription, or restarts one that has lapsed.
    ///
    /// Returns `None` when the user already has a live subscription.
    pub async fn upsert_trial_subscription(
        conn: &mut PgConnection,
        user_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<BillingSubscriptionEntity>, sqlx::Error> {
        sqlx::query_as::<_, BillingSubscriptionEntity>(&format!(
            r#"
            INSERT INTO billing_subscriptions (user_id, status, current_period_start, current_period_end)
            VALUES ($1, 'trialing', $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                status = 'trialing',
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = FALSE,
                canceled_at = NULL,
                updated_at = NOW()
            WHERE billing_subscriptions.status IN ('canceled', 'ended')
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(&mut *conn)
        .await
    }

    // Subscriptions

    pub async fn find_subscription<'e, E>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Option<BillingSubscriptionEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, BillingSubscriptionEntity>(&format!(
            "SELECT {} FROM billing_subscriptions WHERE user_id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Flags a live subscription to end at its period end.
    ///
    /// Only the first caller gets a row back; later or concurrent callers see
    /// `None` because the flag is already set.
    pub async fn schedule_cancel(
        conn: &mut PgConnection,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<BillingSubscriptionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("schedule_subscription_cancel");
        let result = sqlx::query_as::<_, BillingSubscriptionEntity>(&format!(
            r#"
            UPDATE billing_subscriptions
            SET cancel_at_period_end = TRUE, canceled_at = $2, updated_at = NOW()
            WHERE user_id = $1
              AND status IN ('trialing', 'active')
              AND current_period_end > $2
              AND cancel_at_period_end = FALSE
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Clears a scheduled cancellation while the period is still running.
    pub async fn resume(
        conn: &mut PgConnection,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<BillingSubscriptionEntity>, sqlx::Error> {
        sqlx::query_as::<_, BillingSubscriptionEntity>(&format!(
            r#"
            UPDATE billing_subscriptions
            SET cancel_at_period_end = FALSE, canceled_at = NULL, updated_at = NOW()
            WHERE user_id = $1
              AND status IN ('trialing', 'active')
              AND current_period_end > $2
              AND cancel_at_period_end = TRUE
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
    }

    // Promotions

    pub async fn create_promotion(
        &self,
        code: &str,
        grant_days: i32,
        max_redemptions: Option<i32>,
        starts_at: Option<DateTime<Utc>>,
        ends_at: Option<DateTime<Utc>>,
        created_by: Uuid,
    ) -> Result<BillingPromotionEntity, sqlx::Error> {
        sqlx::query_as::<_, BillingPromotionEntity>(&format!(
            r#"
            INSERT INTO billing_promotions (code, grant_days, max_redemptions, starts_at, ends_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            PROMOTION_COLUMNS
        ))
        .bind(code)
        .bind(grant_days)
        .bind(max_redemptions)
        .bind(starts_at)
        .bind(ends_at)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
    }

    /// Looks up a promotion by code, case-insensitively.
    pub async fn find_promotion_by_code<'e, E>(
        executor: E,
        code: &str,
    ) -> Result<Option<BillingPromotionEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, BillingPromotionEntity>(&format!(
            "SELECT {} FROM billing_promotions WHERE UPPER(code) = UPPER($1)",
            PROMOTION_COLUMNS
        ))
        .bind(code)
        .fetch_optional(executor)
        .await
    }

    /// Records a redemption. `None` means this user already redeemed it.
    pub async fn insert_redemption(
        conn: &mut PgConnection,
        promotion_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        let timer = QueryTimer::new("insert_promotion_redemption");
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO billing_promotion_redemptions (promotion_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (promotion_id, user_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(promotion_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    pub async fn find_redemption<'e, E>(
        executor: E,
        promotion_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<PromotionRedemptionEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, PromotionRedemptionEntity>(
            r#"
            SELECT id, promotion_id, user_id, override_id, redeemed_at
            FROM billing_promotion_redemptions
            WHERE promotion_id = $1 AND user_id = $2
            "#,
        )
        .bind(promotion_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Bumps the redemption counter unless the cap is reached.
    pub async fn increment_redemption_count(
        conn: &mut PgConnection,
        promotion_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE billing_promotions
            SET redemption_count = redemption_count + 1
            WHERE id = $1
              AND (max_redemptions IS NULL OR redemption_count < max_redemptions)
            "#,
        )
        .bind(promotion_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn link_redemption_override(
        conn: &mut PgConnection,
        redemption_id: Uuid,
        override_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE billing_promotion_redemptions SET override_id = $2 WHERE id = $1")
            .bind(redemption_id)
            .bind(override_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    // Overrides

    pub async fn insert_override(
        conn: &mut PgConnection,
        user_id: Uuid,
        source_type: OverrideSourceType,
        source_id: Option<Uuid>,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<EntitlementOverrideEntity, sqlx::Error> {
        sqlx::query_as::<_, EntitlementOverrideEntity>(&format!(
            r#"
            INSERT INTO billing_entitlement_overrides (user_id, source_type, source_id, starts_at, ends_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            OVERRIDE_COLUMNS
        ))
        .bind(user_id)
        .bind(source_type.as_str())
        .bind(source_id)
        .bind(starts_at)
        .bind(ends_at)
        .fetch_one(&mut *conn)
        .await
    }

    /// Non-revoked overrides that have not ended by `now`.
    pub async fn list_live_overrides<'e, E>(
        executor: E,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<EntitlementOverrideEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, EntitlementOverrideEntity>(&format!(
            r#"
            SELECT {}
            FROM billing_entitlement_overrides
            WHERE user_id = $1 AND revoked_at IS NULL AND ends_at > $2
            ORDER BY starts_at
            "#,
            OVERRIDE_COLUMNS
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(executor)
        .await
    }

    // Pending grants

    pub async fn create_pending_grant(
        &self,
        email: &str,
        grant_days: i32,
        created_by: Uuid,
    ) -> Result<PendingGrantEntity, sqlx::Error> {
        sqlx::query_as::<_, PendingGrantEntity>(&format!(
            r#"
            INSERT INTO billing_pending_entitlement_grants (email, grant_days, created_by)
            VALUES ($1, $2, $3)
            RETURNING {}
            "#,
            GRANT_COLUMNS
        ))
        .bind(email)
        .bind(grant_days)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
    }

    /// Claims every unclaimed grant for `email` in one conditional update.
    ///
    /// A concurrent claimant blocks on the row locks and then finds
    /// `claimed_at` already set, so each grant is returned to exactly one caller.
    pub async fn claim_pending_grants(
        conn: &mut PgConnection,
        email: &str,
        user_id: Uuid,
        claim_source: &str,
    ) -> Result<Vec<PendingGrantEntity>, sqlx::Error> {
        let timer = QueryTimer::new("claim_pending_grants");
        let result = sqlx::query_as::<_, PendingGrantEntity>(&format!(
            r#"
            UPDATE billing_pending_entitlement_grants
            SET claimed_at = NOW(), claimed_by = $2, claim_source = $3
            WHERE LOWER(email) = LOWER($1) AND claimed_at IS NULL
            RETURNING {}
            "#,
            GRANT_COLUMNS
        ))
        .bind(email)
        .bind(user_id)
        .bind(claim_source)
        .fetch_all(&mut *conn)
        .await;
        timer.record();
        result
    }

    pub async fn link_grant_override(
        conn: &mut PgConnection,
        grant_id: Uuid,
        override_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE billing_pending_entitlement_grants SET override_id = $2 WHERE id = $1")
            .bind(grant_id)
            .bind(override_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
