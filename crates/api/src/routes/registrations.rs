//! Availability and single-registration routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use domain::models::{
    DemoPaymentResult, DistanceAvailability, RegistrantInput, Registration,
    StartRegistrationRequest,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Remaining spots per distance of an edition.
///
/// GET /api/v1/editions/:edition_id/availability
pub async fn edition_availability(
    State(state): State<AppState>,
    Path(edition_id): Path<Uuid>,
) -> Result<Json<Vec<DistanceAvailability>>, ApiError> {
    let availability = state
        .registrations
        .edition_availability(edition_id, Utc::now())
        .await?;
    Ok(Json(availability))
}

/// POST /api/v1/registrations
pub async fn start_registration(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Json(request): Json<StartRegistrationRequest>,
) -> Result<(StatusCode, Json<Registration>), ApiError> {
    let registration = state
        .registrations
        .start_registration(&ctx, request, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// GET /api/v1/registrations
pub async fn list_my_registrations(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
) -> Result<Json<Vec<Registration>>, ApiError> {
    Ok(Json(state.registrations.list_my_registrations(&ctx).await?))
}

/// GET /api/v1/registrations/:registration_id
pub async fn get_registration(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<Registration>, ApiError> {
    Ok(Json(
        state
            .registrations
            .get_my_registration(&ctx, registration_id)
            .await?,
    ))
}

/// POST /api/v1/registrations/:registration_id/submit
pub async fn submit_registration(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(registration_id): Path<Uuid>,
    Json(registrant): Json<RegistrantInput>,
) -> Result<Json<Registration>, ApiError> {
    let registration = state
        .registrations
        .submit_registration(&ctx, registration_id, registrant, Utc::now())
        .await?;
    Ok(Json(registration))
}

/// POST /api/v1/registrations/:registration_id/payment
pub async fn begin_payment(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<Registration>, ApiError> {
    let registration = state
        .registrations
        .begin_payment(&ctx, registration_id, Utc::now())
        .await?;
    Ok(Json(registration))
}

/// POST /api/v1/registrations/:registration_id/demo-complete
pub async fn complete_demo_payment(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<DemoPaymentResult>, ApiError> {
    let result = state
        .registrations
        .complete_demo_payment(&ctx, registration_id, Utc::now())
        .await?;
    Ok(Json(result))
}

/// POST /api/v1/registrations/:registration_id/cancel
pub async fn cancel_registration(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<Registration>, ApiError> {
    let registration = state
        .registrations
        .cancel_registration(&ctx, registration_id, Utc::now())
        .await?;
    Ok(Json(registration))
}
