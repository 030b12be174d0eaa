//! Event edition, distance and add-on models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// How a distance's capacity is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityScope {
    /// The distance has its own capacity.
    PerDistance,
    /// The distance draws from the edition's shared capacity.
    SharedPool,
}

impl CapacityScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerDistance => "per_distance",
            Self::SharedPool => "shared_pool",
        }
    }
}

impl FromStr for CapacityScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per_distance" => Ok(Self::PerDistance),
            "shared_pool" => Ok(Self::SharedPool),
            _ => Err(format!("Unknown capacity scope: {}", s)),
        }
    }
}

/// One dated occurrence of an event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEdition {
    pub id: Uuid,
    pub name: String,
    /// Capacity shared by all `shared_pool` distances; `None` means unbounded.
    pub shared_capacity: Option<i32>,
    pub registration_opens_at: Option<DateTime<Utc>>,
    pub registration_closes_at: Option<DateTime<Utc>>,
}

impl EventEdition {
    /// Whether registration is open at `now`.
    pub fn is_registration_open(&self, now: DateTime<Utc>) -> bool {
        let opened = self.registration_opens_at.map_or(true, |t| t <= now);
        let not_closed = self.registration_closes_at.map_or(true, |t| now < t);
        opened && not_closed
    }
}

/// A race distance within an edition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distance {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub name: String,
    /// `None` means unbounded.
    pub capacity: Option<i32>,
    pub capacity_scope: CapacityScope,
    /// Price used when no pricing tier is active.
    pub price_cents: i64,
}

/// A time-windowed price for a distance (early bird, regular, late).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingTier {
    pub id: Uuid,
    pub distance_id: Uuid,
    pub label: String,
    pub price_cents: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl PricingTier {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.map_or(true, |t| t <= now) && self.ends_at.map_or(true, |t| now < t)
    }
}

/// An optional extra (shirt, transport) sold with a registration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOn {
    pub id: Uuid,
    pub edition_id: Uuid,
    /// When set, the add-on is only sold with this distance.
    pub distance_id: Option<Uuid>,
    pub name: String,
    pub price_cents: i64,
    pub is_active: bool,
}

impl AddOn {
    pub fn is_available_for(&self, distance_id: Uuid) -> bool {
        self.is_active && self.distance_id.map_or(true, |d| d == distance_id)
    }
}

/// Read-time availability of one distance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceAvailability {
    pub distance_id: Uuid,
    pub capacity_scope: CapacityScope,
    pub capacity: Option<i64>,
    pub reserved: i64,
    /// `None` when capacity is unbounded.
    pub spots_remaining: Option<i64>,
}
