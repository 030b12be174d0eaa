//! Registration groups and group-discount resolution.

use domain::models::{
    CreateGroupRequest, GroupDiscount, GroupDiscountRule, GroupDiscountStatus, Registration,
    RegistrationGroup,
};
use domain::services::group_discount::{discount_upgrade, select_discount_rule};
use domain::services::pricing::reprice_with_discount;
use domain::services::PriceBreakdown;
use domain::DomainError;
use persistence::repositories::{EventRepository, GroupRepository, RegistrationRepository};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{validate_input, CommandContext, ServiceResult};

#[derive(Clone)]
pub struct GroupService {
    pool: PgPool,
}

impl GroupService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_group(
        &self,
        ctx: &CommandContext,
        request: CreateGroupRequest,
    ) -> ServiceResult<RegistrationGroup> {
        validate_input(&request)?;
        if EventRepository::find_edition(&self.pool, request.edition_id)
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("edition not found").into());
        }

        let group: RegistrationGroup = GroupRepository::new(self.pool.clone())
            .create(request.edition_id, request.name.trim(), ctx.user_id())
            .await?
            .into();
        tracing::info!(group_id = %group.id, user_id = %ctx.user_id(), "Registration group created");
        Ok(group)
    }

    /// Joins the group and upgrades the discount of its open registrations.
    pub async fn join_group(
        &self,
        ctx: &CommandContext,
        group_id: Uuid,
    ) -> ServiceResult<GroupDiscountStatus> {
        let mut tx = self.pool.begin().await?;
        let group = GroupRepository::lock_group(&mut tx, group_id)
            .await?
            .ok_or_else(|| DomainError::not_found("registration group not found"))?;

        let joined = GroupRepository::join(&mut tx, group.id, ctx.user_id()).await?;
        let updated = sync_open_registrations(&mut tx, group.id, group.edition_id).await?;
        let status = discount_status_in(&mut tx, group.id, group.edition_id).await?;
        tx.commit().await?;

        tracing::info!(
            group_id = %group_id,
            user_id = %ctx.user_id(),
            joined,
            registrations_repriced = updated,
            "Joined registration group"
        );
        Ok(status)
    }

    /// Leaves the group. Discounts already applied are kept.
    pub async fn leave_group(
        &self,
        ctx: &CommandContext,
        group_id: Uuid,
    ) -> ServiceResult<GroupDiscountStatus> {
        let mut tx = self.pool.begin().await?;
        let group = GroupRepository::lock_group(&mut tx, group_id)
            .await?
            .ok_or_else(|| DomainError::not_found("registration group not found"))?;

        if !GroupRepository::leave(&mut tx, group.id, ctx.user_id()).await? {
            return Err(DomainError::invalid_state("not an active member of this group").into());
        }
        sync_open_registrations(&mut tx, group.id, group.edition_id).await?;
        let status = discount_status_in(&mut tx, group.id, group.edition_id).await?;
        tx.commit().await?;

        tracing::info!(group_id = %group_id, user_id = %ctx.user_id(), "Left registration group");
        Ok(status)
    }

    pub async fn discount_status(&self, group_id: Uuid) -> ServiceResult<GroupDiscountStatus> {
        let mut conn = self.pool.acquire().await?;
        let group = GroupRepository::find_by_id(&mut *conn, group_id)
            .await?
            .ok_or_else(|| DomainError::not_found("registration group not found"))?;
        Ok(discount_status_in(&mut conn, group.id, group.edition_id).await?)
    }

    /// Re-applies the group discount to one of the caller's registrations.
    ///
    /// Returns the percent now applied, if any.
    pub async fn sync_registration_discount(
        &self,
        ctx: &CommandContext,
        registration_id: Uuid,
    ) -> ServiceResult<Option<i32>> {
        let mut tx = self.pool.begin().await?;
        let registration: Registration =
            RegistrationRepository::find_for_update(&mut tx, registration_id)
                .await?
                .map(Into::into)
                .ok_or_else(|| DomainError::not_found("registration not found"))?;
        if registration.buyer_user_id != Some(ctx.user_id()) {
            return Err(DomainError::forbidden("registration belongs to another user").into());
        }
        let Some(group_id) = registration.registration_group_id else {
            tx.commit().await?;
            return Ok(registration.group_discount_percent_off);
        };

        GroupRepository::lock_group(&mut tx, group_id).await?;
        let discount = resolve_group_discount(&mut tx, group_id, registration.edition_id).await?;
        let applied = match apply_upgrade(&mut tx, &registration, discount.as_ref()).await? {
            Some(percent_off) => Some(percent_off),
            None => registration.group_discount_percent_off,
        };
        tx.commit().await?;
        Ok(applied)
    }
}

/// Best tier the group currently qualifies for.
pub(crate) async fn resolve_group_discount(
    conn: &mut PgConnection,
    group_id: Uuid,
    edition_id: Uuid,
) -> Result<Option<GroupDiscount>, sqlx::Error> {
    let verified = GroupRepository::count_verified_members(&mut *conn, group_id).await?;
    let rules = active_rules(conn, edition_id).await?;
    Ok(select_discount_rule(&rules, verified))
}

pub(crate) async fn active_rules(
    conn: &mut PgConnection,
    edition_id: Uuid,
) -> Result<Vec<GroupDiscountRule>, sqlx::Error> {
    Ok(GroupRepository::list_active_rules(&mut *conn, edition_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect())
}

async fn discount_status_in(
    conn: &mut PgConnection,
    group_id: Uuid,
    edition_id: Uuid,
) -> Result<GroupDiscountStatus, sqlx::Error> {
    let verified_members = GroupRepository::count_verified_members(&mut *conn, group_id).await?;
    let rules = active_rules(conn, edition_id).await?;
    Ok(GroupDiscountStatus {
        group_id,
        verified_members,
        discount: select_discount_rule(&rules, verified_members),
    })
}

/// Upgrades every open registration of the group. Returns how many changed.
///
/// The caller must hold the group lock.
pub(crate) async fn sync_open_registrations(
    conn: &mut PgConnection,
    group_id: Uuid,
    edition_id: Uuid,
) -> Result<usize, sqlx::Error> {
    let Some(discount) = resolve_group_discount(conn, group_id, edition_id).await? else {
        return Ok(0);
    };

    let open = RegistrationRepository::list_open_for_group(conn, group_id).await?;
    let mut updated = 0;
    for entity in open {
        let registration = Registration::from(entity);
        if apply_upgrade(conn, &registration, Some(&discount)).await?.is_some() {
            updated += 1;
        }
    }
    if updated > 0 {
        tracing::debug!(
            group_id = %group_id,
            percent_off = discount.percent_off,
            updated,
            "Group discount synced"
        );
    }
    Ok(updated)
}

async fn apply_upgrade(
    conn: &mut PgConnection,
    registration: &Registration,
    discount: Option<&GroupDiscount>,
) -> Result<Option<i32>, sqlx::Error> {
    let Some(percent_off) = discount_upgrade(registration.group_discount_percent_off, discount)
    else {
        return Ok(None);
    };
    let repriced = reprice_with_discount(&current_price(registration), percent_off);
    let applied = RegistrationRepository::apply_discount(conn, registration.id, &repriced).await?;
    Ok(applied.then_some(percent_off))
}

fn current_price(registration: &Registration) -> PriceBreakdown {
    PriceBreakdown {
        base_price_cents: registration.base_price_cents,
        discount_amount_cents: registration.discount_amount_cents,
        group_discount_percent_off: registration.group_discount_percent_off,
        add_ons_cents: registration.add_ons_cents,
        fees_cents: registration.fees_cents,
        total_cents: registration.total_cents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::models::{PaymentResponsibility, RegistrationStatus};

    #[test]
    fn test_current_price_keeps_list_price() {
        let now = Utc::now();
        let registration = Registration {
            id: Uuid::new_v4(),
            edition_id: Uuid::new_v4(),
            distance_id: Uuid::new_v4(),
            buyer_user_id: None,
            registration_group_id: None,
            status: RegistrationStatus::Started,
            expires_at: Some(now),
            base_price_cents: 9_000,
            discount_amount_cents: 1_000,
            group_discount_percent_off: Some(10),
            add_ons_cents: 0,
            fees_cents: 500,
            total_cents: 9_500,
            payment_responsibility: PaymentResponsibility::CentralPay,
            created_at: now,
            updated_at: now,
        };
        let price = current_price(&registration);
        assert_eq!(price.list_price_cents(), 10_000);

        let upgraded = reprice_with_discount(&price, 20);
        assert_eq!(upgraded.base_price_cents, 8_000);
        assert_eq!(upgraded.fees_cents, 500);
        assert_eq!(upgraded.total_cents, 8_500);
    }
}
