//! Organizer routes for CSV group batches and their invites.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use domain::models::{
    CreateGroupBatchRequest, GroupBatchSummary, GroupRegistrationBatch,
    GroupRegistrationBatchRow, IssueInvitesResult, ProcessGroupBatchResult,
    PERMISSION_MANAGE_REGISTRATIONS,
};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBatchDetail {
    pub batch: GroupRegistrationBatch,
    pub rows: Vec<GroupRegistrationBatchRow>,
}

/// CSV template with the expected header and one example row.
///
/// GET /api/v1/editions/:edition_id/group-batches/template
pub async fn template(
    State(state): State<AppState>,
    Path(_edition_id): Path<Uuid>,
) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"group-batch-template.csv\"",
            ),
        ],
        state.group_batches.template_csv(),
    )
}

/// Upload a CSV batch. Rows are validated and stored, nothing is reserved.
///
/// POST /api/v1/editions/:edition_id/group-batches
pub async fn create_batch(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(edition_id): Path<Uuid>,
    Json(request): Json<CreateGroupBatchRequest>,
) -> Result<(StatusCode, Json<GroupBatchSummary>), ApiError> {
    let summary = state
        .group_batches
        .create_from_csv(&ctx, edition_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /api/v1/group-batches/:batch_id
pub async fn get_batch(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<GroupBatchDetail>, ApiError> {
    ctx.require_permission(PERMISSION_MANAGE_REGISTRATIONS)?;
    let (batch, rows) = state.group_batches.get_batch(batch_id).await?;
    Ok(Json(GroupBatchDetail { batch, rows }))
}

/// Create every registration of the batch, or none.
///
/// POST /api/v1/group-batches/:batch_id/process
pub async fn process_batch(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<ProcessGroupBatchResult>, ApiError> {
    let result = state
        .group_batches
        .process_batch(&ctx, batch_id, Utc::now())
        .await?;
    Ok(Json(result))
}

/// POST /api/v1/group-batches/:batch_id/invites
pub async fn issue_invites(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<IssueInvitesResult>, ApiError> {
    Ok(Json(state.invites.issue_batch_invites(&ctx, batch_id).await?))
}
