//! Event edition, distance, pricing tier and add-on entities.

use chrono::{DateTime, Utc};
use domain::models::{AddOn, CapacityScope, Distance, EventEdition, PricingTier};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct EventEditionEntity {
    pub id: Uuid,
    pub name: String,
    pub shared_capacity: Option<i32>,
    pub registration_opens_at: Option<DateTime<Utc>>,
    pub registration_closes_at: Option<DateTime<Utc>>,
}

impl From<EventEditionEntity> for EventEdition {
    fn from(entity: EventEditionEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            shared_capacity: entity.shared_capacity,
            registration_opens_at: entity.registration_opens_at,
            registration_closes_at: entity.registration_closes_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DistanceEntity {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub name: String,
    pub capacity: Option<i32>,
    pub capacity_scope: String,
    pub price_cents: i64,
}

impl From<DistanceEntity> for Distance {
    fn from(entity: DistanceEntity) -> Self {
        Self {
            id: entity.id,
            edition_id: entity.edition_id,
            name: entity.name,
            capacity: entity.capacity,
            capacity_scope: entity
                .capacity_scope
                .parse()
                .unwrap_or(CapacityScope::PerDistance),
            price_cents: entity.price_cents,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PricingTierEntity {
    pub id: Uuid,
    pub distance_id: Uuid,
    pub label: String,
    pub price_cents: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl From<PricingTierEntity> for PricingTier {
    fn from(entity: PricingTierEntity) -> Self {
        Self {
            id: entity.id,
            distance_id: entity.distance_id,
            label: entity.label,
            price_cents: entity.price_cents,
            starts_at: entity.starts_at,
            ends_at: entity.ends_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AddOnEntity {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub distance_id: Option<Uuid>,
    pub name: String,
    pub price_cents: i64,
    pub is_active: bool,
}

impl From<AddOnEntity> for AddOn {
    fn from(entity: AddOnEntity) -> Self {
        Self {
            id: entity.id,
            edition_id: entity.edition_id,
            distance_id: entity.distance_id,
            name: entity.name,
            price_cents: entity.price_cents,
            is_active: entity.is_active,
        }
    }
}
