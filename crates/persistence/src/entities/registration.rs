//! Registration entities (database row mappings).

use chrono::{DateTime, NaiveDate, Utc};
use domain::models::{PaymentResponsibility, Registration, RegistrationStatus};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the registrations table.
#[derive(Debug, Clone, FromRow)]
pub struct RegistrationEntity {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub distance_id: Uuid,
    pub buyer_user_id: Option<Uuid>,
    pub registration_group_id: Option<Uuid>,
    pub status: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub base_price_cents: i64,
    pub discount_amount_cents: i64,
    pub group_discount_percent_off: Option<i32>,
    pub add_ons_cents: i64,
    pub fees_cents: i64,
    pub total_cents: i64,
    pub payment_responsibility: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<RegistrationEntity> for Registration {
    fn from(entity: RegistrationEntity) -> Self {
        Self {
            id: entity.id,
            edition_id: entity.edition_id,
            distance_id: entity.distance_id,
            buyer_user_id: entity.buyer_user_id,
            registration_group_id: entity.registration_group_id,
            // The column is CHECK-constrained; an unknown value is treated as
            // cancelled so it never holds capacity.
            status: entity
                .status
                .parse()
                .unwrap_or(RegistrationStatus::Cancelled),
            expires_at: entity.expires_at,
            base_price_cents: entity.base_price_cents,
            discount_amount_cents: entity.discount_amount_cents,
            group_discount_percent_off: entity.group_discount_percent_off,
            add_ons_cents: entity.add_ons_cents,
            fees_cents: entity.fees_cents,
            total_cents: entity.total_cents,
            payment_responsibility: entity
                .payment_responsibility
                .parse()
                .unwrap_or(PaymentResponsibility::SelfPay),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Database row mapping for the registrants table.
#[derive(Debug, Clone, FromRow)]
pub struct RegistrantEntity {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
}
