//! Repository for registrations, registrants and add-on selections.

use chrono::{DateTime, Utc};
use domain::models::{PaymentResponsibility, RegistrantInput, RegistrationStatus};
use domain::services::PriceBreakdown;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::entities::{RegistrantEntity, RegistrationEntity};
use crate::metrics::QueryTimer;

const REGISTRATION_COLUMNS: &str = r#"
    id, edition_id, distance_id, buyer_user_id, registration_group_id, status, expires_at,
    base_price_cents, discount_amount_cents, group_discount_percent_off, add_ons_cents,
    fees_cents, total_cents, payment_responsibility, created_at, updated_at, deleted_at
"#;

/// Values for a new registration row.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub edition_id: Uuid,
    pub distance_id: Uuid,
    pub buyer_user_id: Option<Uuid>,
    pub registration_group_id: Option<Uuid>,
    pub status: RegistrationStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub price: PriceBreakdown,
    pub payment_responsibility: PaymentResponsibility,
}

/// Repository for registration rows.
#[derive(Clone)]
pub struct RegistrationRepository {
    pool: PgPool,
}

impl RegistrationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RegistrationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_registration_by_id");
        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            "SELECT {} FROM registrations WHERE id = $1 AND deleted_at IS NULL",
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Loads a registration and locks its row.
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<RegistrationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_registration_for_update");
        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            "SELECT {} FROM registrations WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    pub async fn insert(
        conn: &mut PgConnection,
        new: &NewRegistration,
    ) -> Result<RegistrationEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_registration");
        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            r#"
            INSERT INTO registrations (
                edition_id, distance_id, buyer_user_id, registration_group_id, status, expires_at,
                base_price_cents, discount_amount_cents, group_discount_percent_off,
                add_ons_cents, fees_cents, total_cents, payment_responsibility
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(new.edition_id)
        .bind(new.distance_id)
        .bind(new.buyer_user_id)
        .bind(new.registration_group_id)
        .bind(new.status.as_str())
        .bind(new.expires_at)
        .bind(new.price.base_price_cents)
        .bind(new.price.discount_amount_cents)
        .bind(new.price.group_discount_percent_off)
        .bind(new.price.add_ons_cents)
        .bind(new.price.fees_cents)
        .bind(new.price.total_cents)
        .bind(new.payment_responsibility.as_str())
        .fetch_one(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Inserts or replaces the participant details of a registration.
    pub async fn upsert_registrant(
        conn: &mut PgConnection,
        registration_id: Uuid,
        input: &RegistrantInput,
    ) -> Result<RegistrantEntity, sqlx::Error> {
        let timer = QueryTimer::new("upsert_registrant");
        let result = sqlx::query_as::<_, RegistrantEntity>(
            r#"
            INSERT INTO registrants (registration_id, first_name, last_name, email, date_of_birth, phone)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (registration_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email = EXCLUDED.email,
                date_of_birth = EXCLUDED.date_of_birth,
                phone = EXCLUDED.phone,
                updated_at = NOW()
            RETURNING id, registration_id, first_name, last_name, email, date_of_birth, phone
            "#,
        )
        .bind(registration_id)
        .bind(input.first_name.trim())
        .bind(input.last_name.trim())
        .bind(input.email.trim())
        .bind(input.date_of_birth)
        .bind(input.phone.as_deref())
        .fetch_one(&mut *conn)
        .await;
        timer.record();
        result
    }

    pub async fn find_registrant<'e, E>(
        executor: E,
        registration_id: Uuid,
    ) -> Result<Option<RegistrantEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, RegistrantEntity>(
            r#"
            SELECT id, registration_id, first_name, last_name, email, date_of_birth, phone
            FROM registrants
            WHERE registration_id = $1
            "#,
        )
        .bind(registration_id)
        .fetch_optional(executor)
        .await
    }

    /// Records a selected add-on at the unit price in force when it was chosen.
    pub async fn insert_add_on_selection(
        conn: &mut PgConnection,
        registration_id: Uuid,
        add_on_id: Uuid,
        unit_price_cents: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO registration_add_on_selections (registration_id, add_on_id, unit_price_cents)
            VALUES ($1, $2, $3)
            ON CONFLICT (registration_id, add_on_id) DO NOTHING
            "#,
        )
        .bind(registration_id)
        .bind(add_on_id)
        .bind(unit_price_cents)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Moves a registration from `from` to `to`, guarded on the current status.
    ///
    /// Returns `false` when another writer changed the status first.
    pub async fn transition_status(
        conn: &mut PgConnection,
        id: Uuid,
        from: RegistrationStatus,
        to: RegistrationStatus,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("transition_registration_status");
        let result = sqlx::query(
            r#"
            UPDATE registrations
            SET status = $3, expires_at = $4, updated_at = NOW()
            WHERE id = $1 AND status = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(expires_at)
        .execute(&mut *conn)
        .await?;
        timer.record();
        Ok(result.rows_affected() > 0)
    }

    /// Lists the non-terminal registrations attached to a group.
    pub async fn list_open_for_group(
        conn: &mut PgConnection,
        group_id: Uuid,
    ) -> Result<Vec<RegistrationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_open_registrations_for_group");
        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            r#"
            SELECT {}
            FROM registrations
            WHERE registration_group_id = $1
              AND deleted_at IS NULL
              AND status IN ('started', 'submitted', 'payment_pending')
            ORDER BY created_at
            FOR UPDATE
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Applies a group discount to one registration.
    ///
    /// Only raises the percentage and only touches non-terminal rows, so a
    /// concurrent or repeated sync can never lower a discount.
    pub async fn apply_discount(
        conn: &mut PgConnection,
        id: Uuid,
        price: &PriceBreakdown,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE registrations
            SET base_price_cents = $2,
                discount_amount_cents = $3,
                group_discount_percent_off = $4,
                total_cents = $5,
                updated_at = NOW()
            WHERE id = $1
              AND deleted_at IS NULL
              AND status IN ('started', 'submitted', 'payment_pending')
              AND (group_discount_percent_off IS NULL OR group_discount_percent_off < $4)
            "#,
        )
        .bind(id)
        .bind(price.base_price_cents)
        .bind(price.discount_amount_cents)
        .bind(price.group_discount_percent_off)
        .bind(price.total_cents)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sets the buyer of an unowned registration.
    pub async fn claim_buyer(
        conn: &mut PgConnection,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE registrations
            SET buyer_user_id = $2, updated_at = NOW()
            WHERE id = $1 AND buyer_user_id IS NULL AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Lists a user's registrations, newest first.
    pub async fn list_for_buyer(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RegistrationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_registrations_for_buyer");
        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            r#"
            SELECT {}
            FROM registrations
            WHERE buyer_user_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}
