//! Trials, promotions, grants and subscription cancellation.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use domain::models::{
    CreatePendingGrantRequest, CreatePromotionRequest, EntitlementSource, PERMISSION_BILLING_ADMIN,
};
use domain::services::NotificationKind;
use uuid::Uuid;

use common::{billing_admin_ctx, insert_user, setup, user_ctx, TestContext};

fn unique_code() -> String {
    format!("RUN-{}", &Uuid::new_v4().simple().to_string()[..12]).to_uppercase()
}

/// Counts rows in `table` owned by `user_id`.
async fn count_user_rows(t: &TestContext, table: &str, user_id: Uuid) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} WHERE user_id = $1", table))
        .bind(user_id)
        .fetch_one(&t.pool)
        .await
        .expect("Failed to count rows")
}

async fn create_promotion(t: &TestContext, max_redemptions: Option<i32>) -> String {
    let admin = insert_user(&t.pool, true).await;
    let code = unique_code();
    t.state
        .billing
        .create_promotion(
            &billing_admin_ctx(admin.id),
            CreatePromotionRequest {
                code: code.to_lowercase(),
                grant_days: 30,
                max_redemptions,
                starts_at: None,
                ends_at: None,
            },
        )
        .await
        .expect("create promotion");
    code
}

#[tokio::test]
async fn test_concurrent_trial_starts_apply_once() {
    let t = setup().await;
    let user = insert_user(&t.pool, true).await;
    let ctx = user_ctx(user.id);
    let now = Utc::now();

    let (first, second) = tokio::join!(
        t.state.billing.start_trial(&ctx, now),
        t.state.billing.start_trial(&ctx, now),
    );
    let results = [first.expect("first call"), second.expect("second call")];
    assert_eq!(results.iter().filter(|r| !r.already_started).count(), 1);
    assert!(results
        .iter()
        .all(|r| r.trial_ends_at == results[0].trial_ends_at));
    assert_eq!(t.notifier.sent_count(NotificationKind::TrialStarted), 1);

    assert_eq!(count_user_rows(&t, "billing_trial_uses", user.id).await, 1);
    assert_eq!(count_user_rows(&t, "billing_subscriptions", user.id).await, 1);

    let status = t.state.billing.get_pro_status(&ctx, now).await.expect("status");
    assert!(status.is_pro);
    assert_eq!(status.effective_source, Some(EntitlementSource::Trial));
    assert_eq!(status.pro_until, results[0].trial_ends_at);
}

#[tokio::test]
async fn test_concurrent_redemptions_by_one_user_apply_once() {
    let t = setup().await;
    let code = create_promotion(&t, None).await;
    let user = insert_user(&t.pool, true).await;
    let ctx = user_ctx(user.id);
    let now = Utc::now();

    let (first, second) = tokio::join!(
        t.state.billing.redeem_promotion(&ctx, &code, now),
        t.state.billing.redeem_promotion(&ctx, &code, now),
    );
    let results = [first.expect("first call"), second.expect("second call")];
    assert_eq!(results.iter().filter(|r| r.already_redeemed).count(), 1);

    assert_eq!(
        count_user_rows(&t, "billing_promotion_redemptions", user.id).await,
        1
    );
    assert_eq!(
        count_user_rows(&t, "billing_entitlement_overrides", user.id).await,
        1
    );
}

#[tokio::test]
async fn test_promotion_cap_admits_single_redeemer() {
    let t = setup().await;
    let code = create_promotion(&t, Some(1)).await;
    let a = insert_user(&t.pool, true).await;
    let b = insert_user(&t.pool, true).await;
    let (ctx_a, ctx_b) = (user_ctx(a.id), user_ctx(b.id));
    let now = Utc::now();

    let (ra, rb) = tokio::join!(
        t.state.billing.redeem_promotion(&ctx_a, &code, now),
        t.state.billing.redeem_promotion(&ctx_b, &code, now),
    );
    let outcomes = [ra, rb];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = outcomes
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one redemption must be refused");
    assert_eq!(loser.code(), "PROMOTION_CAP_REACHED");

    let count: i32 =
        sqlx::query_scalar("SELECT redemption_count FROM billing_promotions WHERE code = $1")
            .bind(&code)
            .fetch_one(&t.pool)
            .await
            .expect("promotion");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_redeeming_twice_is_idempotent() {
    let t = setup().await;
    let code = create_promotion(&t, None).await;
    let user = insert_user(&t.pool, true).await;
    let ctx = user_ctx(user.id);
    let now = Utc::now();

    let first = t
        .state
        .billing
        .redeem_promotion(&ctx, &format!("  {}  ", code.to_lowercase()), now)
        .await
        .expect("first redemption");
    assert!(!first.already_redeemed);
    let pro_until = first.pro_until.expect("promotion grants Pro");
    assert!(pro_until >= now + Duration::days(30) - Duration::seconds(1));

    let second = t
        .state
        .billing
        .redeem_promotion(&ctx, &code, now)
        .await
        .expect("second redemption");
    assert!(second.already_redeemed);
    assert_eq!(second.pro_until, Some(pro_until));
}

#[tokio::test]
async fn test_unknown_or_malformed_codes_are_unavailable() {
    let t = setup().await;
    let user = insert_user(&t.pool, true).await;
    let ctx = user_ctx(user.id);

    for code in ["NOPE-DOES-NOT-EXIST", "!!"] {
        let err = t
            .state
            .billing
            .redeem_promotion(&ctx, code, Utc::now())
            .await
            .expect_err("code cannot be redeemed");
        assert_eq!(err.code(), "PROMOTION_UNAVAILABLE");
    }
}

#[tokio::test]
async fn test_duplicate_promotion_code_is_rejected() {
    let t = setup().await;
    let code = create_promotion(&t, None).await;
    let admin = insert_user(&t.pool, true).await;

    let err = t
        .state
        .billing
        .create_promotion(
            &billing_admin_ctx(admin.id),
            CreatePromotionRequest {
                code,
                grant_days: 7,
                max_redemptions: None,
                starts_at: None,
                ends_at: None,
            },
        )
        .await
        .expect_err("code is taken");
    assert_eq!(err.code(), "INVALID_STATE");
}

#[tokio::test]
async fn test_cancel_and_resume_are_idempotent() {
    let t = setup().await;
    let user = insert_user(&t.pool, true).await;
    let ctx = user_ctx(user.id);
    let now = Utc::now();

    let err = t
        .state
        .billing
        .schedule_cancel(&ctx, now)
        .await
        .expect_err("nothing to cancel yet");
    assert_eq!(err.code(), "NO_ACTIVE_SUBSCRIPTION");

    let trial = t.state.billing.start_trial(&ctx, now).await.expect("trial");
    let trial_end = trial.trial_ends_at.expect("trial end");

    let scheduled = t.state.billing.schedule_cancel(&ctx, now).await.expect("cancel");
    assert!(!scheduled.already_scheduled);
    assert_eq!(scheduled.cancel_at, trial_end);
    assert_eq!(
        t.notifier.sent_count(NotificationKind::CancellationScheduled),
        1
    );

    let again = t.state.billing.schedule_cancel(&ctx, now).await.expect("cancel again");
    assert!(again.already_scheduled);

    let resumed = t
        .state
        .billing
        .resume_subscription(&ctx, now)
        .await
        .expect("resume");
    assert!(!resumed.already_active);

    let resumed_again = t
        .state
        .billing
        .resume_subscription(&ctx, now)
        .await
        .expect("resume again");
    assert!(resumed_again.already_active);

    // Pro continues until the original period end either way.
    let status = t.state.billing.get_pro_status(&ctx, now).await.expect("status");
    assert_eq!(status.pro_until, Some(trial_end));
}

#[tokio::test]
async fn test_concurrent_cancels_send_one_email() {
    let t = setup().await;
    let user = insert_user(&t.pool, true).await;
    let ctx = user_ctx(user.id);
    let now = Utc::now();
    t.state.billing.start_trial(&ctx, now).await.expect("trial");

    let (first, second) = tokio::join!(
        t.state.billing.schedule_cancel(&ctx, now),
        t.state.billing.schedule_cancel(&ctx, now),
    );
    let results = [first.expect("first call"), second.expect("second call")];
    assert_eq!(results.iter().filter(|r| !r.already_scheduled).count(), 1);
    assert_eq!(results[0].cancel_at, results[1].cancel_at);
    assert_eq!(
        t.notifier.sent_count(NotificationKind::CancellationScheduled),
        1
    );
}

#[tokio::test]
async fn test_concurrent_grant_claims_have_one_winner() {
    let t = setup().await;
    let admin = insert_user(&t.pool, true).await;
    let user = insert_user(&t.pool, true).await;
    t.state
        .billing
        .create_pending_grant(
            &billing_admin_ctx(admin.id),
            CreatePendingGrantRequest {
                email: user.email.clone(),
                grant_days: Some(14),
            },
        )
        .await
        .expect("grant");

    let ctx = user_ctx(user.id);
    let now = Utc::now();
    let (first, second) = tokio::join!(
        t.state.billing.claim_pending_grants(&ctx, "login", now),
        t.state.billing.claim_pending_grants(&ctx, "login", now),
    );
    let mut claimed = [
        first.expect("first call").claimed_count,
        second.expect("second call").claimed_count,
    ];
    claimed.sort_unstable();
    assert_eq!(claimed, [0, 1]);
    assert_eq!(
        count_user_rows(&t, "billing_entitlement_overrides", user.id).await,
        1
    );
}

#[tokio::test]
async fn test_pending_grants_need_verified_email() {
    let t = setup().await;
    let admin = insert_user(&t.pool, true).await;
    let unverified = insert_user(&t.pool, false).await;
    let verified = insert_user(&t.pool, true).await;
    let admin_ctx = billing_admin_ctx(admin.id);

    for email in [&unverified.email, &verified.email] {
        t.state
            .billing
            .create_pending_grant(
                &admin_ctx,
                CreatePendingGrantRequest {
                    email: email.to_uppercase(),
                    grant_days: Some(10),
                },
            )
            .await
            .expect("grant");
    }

    let err = t
        .state
        .billing
        .claim_pending_grants(&user_ctx(unverified.id), "manual", Utc::now())
        .await
        .expect_err("unverified email");
    assert_eq!(err.code(), "FORBIDDEN");

    let ctx = user_ctx(verified.id);
    let claimed = t
        .state
        .billing
        .claim_pending_grants(&ctx, "login", Utc::now())
        .await
        .expect("claim");
    assert_eq!(claimed.claimed_count, 1);
    assert_eq!(claimed.overrides_created, 1);

    let none_left = t
        .state
        .billing
        .claim_pending_grants(&ctx, "login", Utc::now())
        .await
        .expect("second claim");
    assert_eq!(none_left.claimed_count, 0);

    let status = t
        .state
        .billing
        .get_pro_status(&ctx, Utc::now())
        .await
        .expect("status");
    assert!(status.is_pro);
    assert_eq!(status.effective_source, Some(EntitlementSource::Override));
}

#[tokio::test]
async fn test_admin_routes_require_billing_permission() {
    let t = setup().await;
    let user = insert_user(&t.pool, true).await;
    let body = serde_json::json!({ "code": unique_code(), "grantDays": 5 });

    let token = t.token(user.id, &[]);
    let (status, response) = common::send(
        t.app(),
        Method::POST,
        "/api/v1/admin/billing/promotions",
        Some(&token),
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"], "FORBIDDEN");

    let admin_token = t.token(user.id, &[PERMISSION_BILLING_ADMIN]);
    let (status, response) = common::send(
        t.app(),
        Method::POST,
        "/api/v1/admin/billing/promotions",
        Some(&admin_token),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(response["grantDays"], 5);
}

#[tokio::test]
async fn test_cleanup_removes_only_stale_unverified_accounts() {
    let t = setup().await;
    let stale = insert_user(&t.pool, false).await;
    let fresh = insert_user(&t.pool, false).await;
    let verified = insert_user(&t.pool, true).await;
    common::backdate_user(&t.pool, stale.id, 72).await;
    common::backdate_user(&t.pool, verified.id, 72).await;

    let report = t
        .state
        .users
        .cleanup_unverified_users(Utc::now() - Duration::hours(48))
        .await
        .expect("cleanup");
    assert!(report.deleted >= 1);

    let remaining: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM users WHERE id = ANY($1)")
            .bind(vec![stale.id, fresh.id, verified.id])
            .fetch_all(&t.pool)
            .await
            .expect("users");
    assert!(!remaining.contains(&stale.id));
    assert!(remaining.contains(&fresh.id));
    assert!(remaining.contains(&verified.id));
}
