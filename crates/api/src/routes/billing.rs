//! Billing and Pro entitlement routes.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use domain::models::{
    ClaimGrantsResult, ProEntitlement, RedeemPromotionRequest, RedeemPromotionResult,
    ResumeSubscriptionResult, ScheduleCancelResult, StartTrialResult,
};
use domain::services::ProFeatureDecision;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimGrantsRequest {
    #[serde(default)]
    pub claim_source: Option<String>,
}

const DEFAULT_CLAIM_SOURCE: &str = "manual";

/// GET /api/v1/billing/status
pub async fn pro_status(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
) -> Result<Json<ProEntitlement>, ApiError> {
    Ok(Json(state.billing.get_pro_status(&ctx, Utc::now()).await?))
}

/// GET /api/v1/billing/features/:feature_key
pub async fn feature_decision(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(feature_key): Path<String>,
) -> Result<Json<ProFeatureDecision>, ApiError> {
    Ok(Json(
        state
            .billing
            .feature_decision(&ctx, &feature_key, Utc::now())
            .await?,
    ))
}

/// POST /api/v1/billing/trial
pub async fn start_trial(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
) -> Result<Json<StartTrialResult>, ApiError> {
    Ok(Json(state.billing.start_trial(&ctx, Utc::now()).await?))
}

/// POST /api/v1/billing/promotions/redeem
pub async fn redeem_promotion(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Json(request): Json<RedeemPromotionRequest>,
) -> Result<Json<RedeemPromotionResult>, ApiError> {
    Ok(Json(
        state
            .billing
            .redeem_promotion(&ctx, &request.code, Utc::now())
            .await?,
    ))
}

/// POST /api/v1/billing/grants/claim
pub async fn claim_pending_grants(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    body: Option<Json<ClaimGrantsRequest>>,
) -> Result<Json<ClaimGrantsResult>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let source = request
        .claim_source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CLAIM_SOURCE);
    Ok(Json(
        state
            .billing
            .claim_pending_grants(&ctx, source, Utc::now())
            .await?,
    ))
}

/// POST /api/v1/billing/cancel
pub async fn schedule_cancel(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
) -> Result<Json<ScheduleCancelResult>, ApiError> {
    Ok(Json(state.billing.schedule_cancel(&ctx, Utc::now()).await?))
}

/// POST /api/v1/billing/resume
pub async fn resume_subscription(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
) -> Result<Json<ResumeSubscriptionResult>, ApiError> {
    Ok(Json(
        state.billing.resume_subscription(&ctx, Utc::now()).await?,
    ))
}
