//! Registration group routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::{CreateGroupRequest, GroupDiscountStatus, RegistrationGroup};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDiscountResponse {
    pub registration_id: Uuid,
    pub group_discount_percent_off: Option<i32>,
}

/// Create a group. The creator becomes its first member.
///
/// POST /api/v1/groups
pub async fn create_group(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<RegistrationGroup>), ApiError> {
    let group = state.groups.create_group(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// POST /api/v1/groups/:group_id/join
pub async fn join_group(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupDiscountStatus>, ApiError> {
    Ok(Json(state.groups.join_group(&ctx, group_id).await?))
}

/// POST /api/v1/groups/:group_id/leave
pub async fn leave_group(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupDiscountStatus>, ApiError> {
    Ok(Json(state.groups.leave_group(&ctx, group_id).await?))
}

/// GET /api/v1/groups/:group_id/discount
pub async fn discount_status(
    State(state): State<AppState>,
    _user: UserAuth,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupDiscountStatus>, ApiError> {
    Ok(Json(state.groups.discount_status(group_id).await?))
}

/// Re-applies the group discount to one of the caller's registrations.
///
/// POST /api/v1/registrations/:registration_id/sync-discount
pub async fn sync_registration_discount(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<SyncDiscountResponse>, ApiError> {
    let percent_off = state
        .groups
        .sync_registration_discount(&ctx, registration_id)
        .await?;
    Ok(Json(SyncDiscountResponse {
        registration_id,
        group_discount_percent_off: percent_off,
    }))
}
