//! Single-registration commands: availability, start, lifecycle transitions.

use chrono::{DateTime, Utc};
use domain::models::{
    AuditAction, DemoPaymentResult, Distance, DistanceAvailability, EventEdition,
    PaymentResponsibility, PricingTier, RegistrantInput, Registration, RegistrationStatus,
    StartRegistrationRequest,
};
use domain::services::capacity::{self, CapacityKey};
use domain::services::lifecycle::{self, LifecycleAction, TransitionPlan};
use domain::services::{pricing, AuditLogBuilder, HoldPolicy};
use domain::DomainError;
use persistence::repositories::{
    AuditLogRepository, EventRepository, GroupRepository, InviteRepository, NewRegistration,
    RegistrationRepository,
};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::groups::resolve_group_discount;
use super::{validate_input, CommandContext, ServiceError, ServiceResult};
use crate::middleware::metrics::record_registrations_created;

#[derive(Clone)]
pub struct RegistrationService {
    pool: PgPool,
    hold_policy: HoldPolicy,
    fee_basis_points: i32,
}

impl RegistrationService {
    pub fn new(pool: PgPool, hold_policy: HoldPolicy, fee_basis_points: i32) -> Self {
        Self {
            pool,
            hold_policy,
            fee_basis_points,
        }
    }

    /// Per-distance availability computed from the live rows at `now`.
    pub async fn edition_availability(
        &self,
        edition_id: Uuid,
        now: DateTime<Utc>,
    ) -> ServiceResult<Vec<DistanceAvailability>> {
        let edition: EventEdition = EventRepository::find_edition(&self.pool, edition_id)
            .await?
            .map(Into::into)
            .ok_or_else(|| DomainError::not_found("edition not found"))?;
        let distances: Vec<Distance> = EventRepository::list_distances(&self.pool, edition_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        let counts: HashMap<Uuid, i64> = EventRepository::new(self.pool.clone())
            .reserved_counts_by_distance(edition_id, now)
            .await?
            .into_iter()
            .collect();
        let edition_reserved: i64 = counts.values().sum();

        Ok(distances
            .iter()
            .map(|distance| {
                let reserved = match CapacityKey::for_distance(distance) {
                    CapacityKey::SharedPool(_) => edition_reserved,
                    CapacityKey::Distance(id) => counts.get(&id).copied().unwrap_or(0),
                };
                capacity::distance_availability(distance, &edition, reserved)
            })
            .collect())
    }

    /// Creates a `started` hold for the caller on one distance.
    pub async fn start_registration(
        &self,
        ctx: &CommandContext,
        request: StartRegistrationRequest,
        now: DateTime<Utc>,
    ) -> ServiceResult<Registration> {
        let mut tx = self.pool.begin().await?;

        let edition: EventEdition = EventRepository::lock_edition(&mut tx, request.edition_id)
            .await?
            .map(Into::into)
            .ok_or_else(|| DomainError::not_found("edition not found"))?;
        if !edition.is_registration_open(now) {
            return Err(DomainError::invalid_state("registration is not open for this edition").into());
        }

        let distance: Distance = EventRepository::find_distance(&mut *tx, request.distance_id)
            .await?
            .map(Distance::from)
            .filter(|d| d.edition_id == edition.id)
            .ok_or_else(|| DomainError::not_found("distance not found"))?;

        let discount = match request.registration_group_id {
            Some(group_id) => {
                let group = GroupRepository::find_by_id(&mut *tx, group_id)
                    .await?
                    .filter(|g| g.edition_id == edition.id)
                    .ok_or_else(|| DomainError::not_found("registration group not found"))?;
                let members = GroupRepository::list_active_members(&mut *tx, group.id).await?;
                if !members.iter().any(|m| m.user_id == ctx.user_id()) {
                    return Err(DomainError::forbidden("not a member of this group").into());
                }
                resolve_group_discount(&mut tx, group.id, edition.id).await?
            }
            None => None,
        };

        ensure_capacity(&mut tx, &edition, &[&distance], now).await?;

        let tiers: Vec<PricingTier> = EventRepository::list_pricing_tiers(&mut *tx, distance.id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        let price = pricing::compute_price(
            pricing::select_base_price(&distance, &tiers, now),
            0,
            discount.map(|d| d.percent_off),
            self.fee_basis_points,
        );

        let new = NewRegistration {
            edition_id: edition.id,
            distance_id: distance.id,
            buyer_user_id: Some(ctx.user_id()),
            registration_group_id: request.registration_group_id,
            status: RegistrationStatus::Started,
            expires_at: self
                .hold_policy
                .compute_expires_at(now, RegistrationStatus::Started),
            price,
            payment_responsibility: PaymentResponsibility::SelfPay,
        };
        let registration: Registration = RegistrationRepository::insert(&mut tx, &new).await?.into();
        tx.commit().await?;

        record_registrations_created("single", 1);
        tracing::info!(
            registration_id = %registration.id,
            user_id = %ctx.user_id(),
            distance_id = %distance.id,
            total_cents = registration.total_cents,
            "Registration started"
        );
        Ok(registration)
    }

    /// `started -> submitted`, storing the participant details.
    pub async fn submit_registration(
        &self,
        ctx: &CommandContext,
        registration_id: Uuid,
        mut registrant: RegistrantInput,
        now: DateTime<Utc>,
    ) -> ServiceResult<Registration> {
        validate_input(&registrant)?;
        registrant.email = shared::validation::normalize_email(&registrant.email);

        let mut tx = self.pool.begin().await?;
        let (registration, _) = self
            .apply_transition(&mut tx, ctx, registration_id, LifecycleAction::Submit, now)
            .await?;
        RegistrationRepository::upsert_registrant(&mut tx, registration_id, &registrant).await?;
        tx.commit().await?;

        tracing::info!(registration_id = %registration_id, "Registration submitted");
        Ok(registration)
    }

    /// `submitted -> payment_pending`.
    pub async fn begin_payment(
        &self,
        ctx: &CommandContext,
        registration_id: Uuid,
        now: DateTime<Utc>,
    ) -> ServiceResult<Registration> {
        let mut tx = self.pool.begin().await?;
        let (registration, _) = self
            .apply_transition(&mut tx, ctx, registration_id, LifecycleAction::BeginPayment, now)
            .await?;
        tx.commit().await?;

        tracing::info!(registration_id = %registration_id, "Registration awaiting payment");
        Ok(registration)
    }

    /// Confirms a `payment_pending` registration without a payment provider.
    ///
    /// Idempotent once confirmed. A lapsed hold is `REGISTRATION_EXPIRED`.
    pub async fn complete_demo_payment(
        &self,
        ctx: &CommandContext,
        registration_id: Uuid,
        now: DateTime<Utc>,
    ) -> ServiceResult<DemoPaymentResult> {
        let mut tx = self.pool.begin().await?;
        let (registration, plan) = self
            .apply_transition(
                &mut tx,
                ctx,
                registration_id,
                LifecycleAction::CompleteDemoPayment,
                now,
            )
            .await?;

        let already_confirmed = plan == TransitionPlan::AlreadyDone;
        if !already_confirmed {
            let entry = AuditLogBuilder::user_action(ctx.user_id(), AuditAction::RegistrationConfirm)
                .on_resource("registration", registration_id)
                .with_metadata("totalCents", registration.total_cents)
                .with_request_id(ctx.request_id.clone())
                .build();
            AuditLogRepository::insert(&mut tx, &entry).await?;
        }
        tx.commit().await?;

        tracing::info!(
            registration_id = %registration_id,
            already_confirmed,
            "Demo payment completed"
        );
        Ok(DemoPaymentResult {
            registration_id,
            status: registration.status,
            already_confirmed,
        })
    }

    /// Cancels a hold. Cancelling twice is a no-op.
    pub async fn cancel_registration(
        &self,
        ctx: &CommandContext,
        registration_id: Uuid,
        now: DateTime<Utc>,
    ) -> ServiceResult<Registration> {
        let mut tx = self.pool.begin().await?;
        let (registration, plan) = self
            .apply_transition(&mut tx, ctx, registration_id, LifecycleAction::Cancel, now)
            .await?;
        if matches!(plan, TransitionPlan::Apply { .. }) {
            InviteRepository::cancel_for_registration(&mut tx, registration_id).await?;
        }
        tx.commit().await?;

        tracing::info!(registration_id = %registration_id, "Registration cancelled");
        Ok(registration)
    }

    pub async fn get_my_registration(
        &self,
        ctx: &CommandContext,
        registration_id: Uuid,
    ) -> ServiceResult<Registration> {
        let found = RegistrationRepository::new(self.pool.clone())
            .find_by_id(registration_id)
            .await?
            .map(Registration::from);
        Ok(lifecycle::ensure_owner(found, ctx.user_id())?)
    }

    pub async fn list_my_registrations(
        &self,
        ctx: &CommandContext,
    ) -> ServiceResult<Vec<Registration>> {
        Ok(RegistrationRepository::new(self.pool.clone())
            .list_for_buyer(ctx.user_id())
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    /// Locks the caller's registration, plans `action` and applies it with an
    /// update guarded on the planned source status.
    async fn apply_transition(
        &self,
        conn: &mut PgConnection,
        ctx: &CommandContext,
        registration_id: Uuid,
        action: LifecycleAction,
        now: DateTime<Utc>,
    ) -> ServiceResult<(Registration, TransitionPlan)> {
        let current = RegistrationRepository::find_for_update(conn, registration_id)
            .await?
            .map(Registration::from);
        let mut registration = lifecycle::ensure_owner(current, ctx.user_id())?;
        let plan =
            lifecycle::plan_transition(action, registration.status, registration.expires_at, now)?;

        if let TransitionPlan::Apply { from, to } = plan {
            let expires_at = self.hold_policy.compute_expires_at(now, to);
            if !RegistrationRepository::transition_status(conn, registration_id, from, to, expires_at)
                .await?
            {
                return Err(ServiceError::LostRace(format!(
                    "{} on registration {}",
                    action.as_str(),
                    registration_id
                )));
            }
            registration.status = to;
            registration.expires_at = expires_at;
            registration.updated_at = now;
        }
        Ok((registration, plan))
    }
}

/// Checks that `distances` (one entry per new registration) fit in what is
/// left at `now`. The caller must hold the edition lock.
pub(crate) async fn ensure_capacity(
    conn: &mut PgConnection,
    edition: &EventEdition,
    distances: &[&Distance],
    now: DateTime<Utc>,
) -> ServiceResult<()> {
    let demand = capacity::aggregate_demand(distances.iter().copied());
    let mut limits = HashMap::with_capacity(demand.len());

    for key in demand.keys() {
        let limit = match *key {
            CapacityKey::Distance(distance_id) => {
                let capacity = distances
                    .iter()
                    .find(|d| d.id == distance_id)
                    .and_then(|d| capacity::effective_capacity(d, edition));
                let reserved = match capacity {
                    Some(_) => {
                        EventRepository::count_reserved_for_distance(&mut *conn, distance_id, now)
                            .await?
                    }
                    None => 0,
                };
                (capacity, reserved)
            }
            CapacityKey::SharedPool(edition_id) => {
                let capacity = edition.shared_capacity.map(i64::from);
                let reserved = match capacity {
                    Some(_) => {
                        EventRepository::count_reserved_for_edition(&mut *conn, edition_id, now)
                            .await?
                    }
                    None => 0,
                };
                (capacity, reserved)
            }
        };
        limits.insert(*key, limit);
    }

    capacity::check_demand(&demand, &limits).map_err(DomainError::from)?;
    Ok(())
}
