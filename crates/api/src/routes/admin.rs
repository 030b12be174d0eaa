//! Billing administration and account routes.
//!
//! Billing and cleanup need the `billing:admin` permission; account events
//! need `users:manage`. Internal staff hold both implicitly.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use domain::models::{
    BillingPromotion, CreatePendingGrantRequest, CreatePromotionRequest, EmailVerificationResult,
    PendingEntitlementGrant, UnverifiedCleanupReport, PERMISSION_BILLING_ADMIN,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupUnverifiedRequest {
    /// Overrides the configured retention for this run.
    pub older_than_hours: Option<i64>,
}

/// POST /api/v1/admin/billing/promotions
pub async fn create_promotion(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Json(request): Json<CreatePromotionRequest>,
) -> Result<(StatusCode, Json<BillingPromotion>), ApiError> {
    let promotion = state.billing.create_promotion(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(promotion)))
}

/// POST /api/v1/admin/billing/grants
pub async fn create_pending_grant(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Json(request): Json<CreatePendingGrantRequest>,
) -> Result<(StatusCode, Json<PendingEntitlementGrant>), ApiError> {
    let grant = state.billing.create_pending_grant(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

/// Called by the account service once a user confirms their email.
///
/// POST /api/v1/admin/users/:user_id/email-verified
pub async fn mark_email_verified(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(user_id): Path<Uuid>,
) -> Result<Json<EmailVerificationResult>, ApiError> {
    let result = state.users.mark_email_verified(&ctx, user_id).await?;
    Ok(Json(result))
}

/// Purge unverified accounts now instead of waiting for the scheduled job.
///
/// POST /api/v1/admin/users/cleanup-unverified
pub async fn cleanup_unverified_users(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    body: Option<Json<CleanupUnverifiedRequest>>,
) -> Result<Json<UnverifiedCleanupReport>, ApiError> {
    ctx.require_permission(PERMISSION_BILLING_ADMIN)?;

    let request = body.map(|Json(r)| r).unwrap_or_default();
    let hours = request
        .older_than_hours
        .unwrap_or(state.config.jobs.unverified_user_retention_hours);
    if hours < 1 {
        return Err(ApiError::Validation(
            "olderThanHours must be at least 1".to_string(),
        ));
    }

    let report = state
        .users
        .cleanup_unverified_users(Utc::now() - Duration::hours(hours))
        .await?;
    info!(
        user_id = %ctx.user_id(),
        candidates = report.candidates,
        deleted = report.deleted,
        "Unverified users purged on request"
    );
    Ok(Json(report))
}
