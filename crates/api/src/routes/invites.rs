//! Registration invite routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use domain::models::{
    ClaimInviteRequest, ClaimInviteResult, RegistrationInvite, PERMISSION_MANAGE_REGISTRATIONS,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Claim the registration behind an invite token for the caller.
///
/// POST /api/v1/invites/claim
pub async fn claim_invite(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Json(request): Json<ClaimInviteRequest>,
) -> Result<Json<ClaimInviteResult>, ApiError> {
    let result = state
        .invites
        .claim_invite(&ctx, &request.token, Utc::now())
        .await?;
    Ok(Json(result))
}

/// POST /api/v1/invites/:invite_id/resend
pub async fn resend_invite(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(invite_id): Path<Uuid>,
) -> Result<Json<RegistrationInvite>, ApiError> {
    Ok(Json(state.invites.resend_invite(&ctx, invite_id).await?))
}

/// POST /api/v1/invites/:invite_id/cancel
pub async fn cancel_invite(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(invite_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.invites.cancel_invite(&ctx, invite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Invite history of one registration, newest first.
///
/// GET /api/v1/registrations/:registration_id/invites
pub async fn list_for_registration(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<Vec<RegistrationInvite>>, ApiError> {
    ctx.require_permission(PERMISSION_MANAGE_REGISTRATIONS)?;
    Ok(Json(
        state.invites.list_for_registration(registration_id).await?,
    ))
}
