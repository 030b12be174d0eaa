//! Capacity and availability calculation.
//!
//! Reserved counts are always derived from the current rows at read time,
//! never from a cached counter, so lapsed holds free their slot without a sweep.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{
    CapacityScope, Distance, DistanceAvailability, EventEdition, RegistrationStatus,
};
use crate::services::hold_policy::is_reserved;

/// The unit a capacity limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapacityKey {
    Distance(Uuid),
    /// The shared pool of an edition.
    SharedPool(Uuid),
}

impl CapacityKey {
    pub fn for_distance(distance: &Distance) -> Self {
        match distance.capacity_scope {
            CapacityScope::PerDistance => Self::Distance(distance.id),
            CapacityScope::SharedPool => Self::SharedPool(distance.edition_id),
        }
    }
}

/// Minimal registration state needed to decide whether it holds a slot.
#[derive(Debug, Clone, Copy)]
pub struct Reservation {
    pub distance_id: Uuid,
    pub status: RegistrationStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub deleted: bool,
}

/// Counts reservations that hold a slot at `now`.
pub fn count_reserved<'a, I>(reservations: I, now: DateTime<Utc>) -> i64
where
    I: IntoIterator<Item = &'a Reservation>,
{
    reservations
        .into_iter()
        .filter(|r| !r.deleted && is_reserved(r.status, r.expires_at, now))
        .count() as i64
}

/// Capacity limit applying to a distance. `None` means unbounded.
pub fn effective_capacity(distance: &Distance, edition: &EventEdition) -> Option<i64> {
    match distance.capacity_scope {
        CapacityScope::PerDistance => distance.capacity.map(i64::from),
        CapacityScope::SharedPool => edition.shared_capacity.map(i64::from),
    }
}

/// `max(capacity - reserved, 0)`, or `None` when unbounded.
pub fn spots_remaining(capacity: Option<i64>, reserved: i64) -> Option<i64> {
    capacity.map(|c| (c - reserved).max(0))
}

/// Builds the availability view of a distance from its reserved count.
///
/// For shared pools `reserved` must be the edition-wide count.
pub fn distance_availability(
    distance: &Distance,
    edition: &EventEdition,
    reserved: i64,
) -> DistanceAvailability {
    let capacity = effective_capacity(distance, edition);
    DistanceAvailability {
        distance_id: distance.id,
        capacity_scope: distance.capacity_scope,
        capacity,
        reserved,
        spots_remaining: spots_remaining(capacity, reserved),
    }
}

/// Aggregates the slots a set of new registrations would consume per capacity key.
///
/// A shared pool is counted edition-wide, so once any row touches the pool
/// every row of the set counts against it.
pub fn aggregate_demand<'a, I>(distances: I) -> HashMap<CapacityKey, i64>
where
    I: IntoIterator<Item = &'a Distance>,
{
    let distances: Vec<&Distance> = distances.into_iter().collect();
    let total = distances.len() as i64;
    let mut demand = HashMap::new();
    for distance in distances {
        match CapacityKey::for_distance(distance) {
            key @ CapacityKey::Distance(_) => *demand.entry(key).or_insert(0) += 1,
            key @ CapacityKey::SharedPool(_) => {
                demand.insert(key, total);
            }
        }
    }
    demand
}

/// A key whose demand exceeds what is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityShortfall {
    pub key: CapacityKey,
    pub requested: i64,
    pub remaining: i64,
}

/// Checks every key's demand against its remaining spots.
///
/// `limits` maps each key to `(capacity, reserved)`. Keys missing from
/// `limits` or with unbounded capacity always fit.
pub fn check_demand(
    demand: &HashMap<CapacityKey, i64>,
    limits: &HashMap<CapacityKey, (Option<i64>, i64)>,
) -> Result<(), CapacityShortfall> {
    let mut keys: Vec<_> = demand.iter().collect();
    keys.sort_by_key(|(k, _)| match k {
        CapacityKey::Distance(id) | CapacityKey::SharedPool(id) => *id,
    });

    for (key, requested) in keys {
        let Some((capacity, reserved)) = limits.get(key) else {
            continue;
        };
        if let Some(remaining) = spots_remaining(*capacity, *reserved) {
            if *requested > remaining {
                return Err(CapacityShortfall {
                    key: *key,
                    requested: *requested,
                    remaining,
                });
            }
        }
    }
    Ok(())
}

impl From<CapacityShortfall> for DomainError {
    fn from(s: CapacityShortfall) -> Self {
        let scope = match s.key {
            CapacityKey::Distance(id) => format!("distance {}", id),
            CapacityKey::SharedPool(id) => format!("shared pool of edition {}", id),
        };
        DomainError::insufficient_capacity(format!(
            "{} requested {} spots but only {} remain",
            scope, s.requested, s.remaining
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn edition(shared: Option<i32>) -> EventEdition {
        EventEdition {
            id: Uuid::new_v4(),
            name: "City Marathon".into(),
            shared_capacity: shared,
            registration_opens_at: None,
            registration_closes_at: None,
        }
    }

    fn distance(edition: &EventEdition, capacity: Option<i32>, scope: CapacityScope) -> Distance {
        Distance {
            id: Uuid::new_v4(),
            edition_id: edition.id,
            name: "10K".into(),
            capacity,
            capacity_scope: scope,
            price_cents: 10_000,
        }
    }

    fn reservation(status: RegistrationStatus, expires_at: Option<DateTime<Utc>>) -> Reservation {
        Reservation {
            distance_id: Uuid::new_v4(),
            status,
            expires_at,
            deleted: false,
        }
    }

    #[test]
    fn test_count_reserved_excludes_lapsed_and_deleted() {
        let now = now();
        let mut deleted = reservation(RegistrationStatus::Confirmed, None);
        deleted.deleted = true;
        let rows = vec![
            reservation(RegistrationStatus::Confirmed, None),
            reservation(RegistrationStatus::Confirmed, Some(now - Duration::days(3))),
            reservation(RegistrationStatus::Started, Some(now + Duration::minutes(5))),
            reservation(RegistrationStatus::Submitted, Some(now)),
            reservation(RegistrationStatus::PaymentPending, None),
            reservation(RegistrationStatus::Cancelled, Some(now + Duration::hours(1))),
            deleted,
        ];
        assert_eq!(count_reserved(&rows, now), 3);
    }

    #[test]
    fn test_spots_remaining_is_floored() {
        assert_eq!(spots_remaining(Some(10), 3), Some(7));
        assert_eq!(spots_remaining(Some(2), 5), Some(0));
        assert_eq!(spots_remaining(None, 500), None);
    }

    #[test]
    fn test_spots_remaining_follows_formula() {
        for capacity in 0..6i64 {
            for reserved in 0..8i64 {
                assert_eq!(
                    spots_remaining(Some(capacity), reserved),
                    Some((capacity - reserved).max(0))
                );
            }
        }
    }

    #[test]
    fn test_shared_pool_uses_edition_capacity() {
        let ed = edition(Some(100));
        let d = distance(&ed, Some(5), CapacityScope::SharedPool);
        let view = distance_availability(&d, &ed, 40);
        assert_eq!(view.capacity, Some(100));
        assert_eq!(view.spots_remaining, Some(60));

        let own = distance(&ed, Some(5), CapacityScope::PerDistance);
        assert_eq!(distance_availability(&own, &ed, 4).spots_remaining, Some(1));
    }

    #[test]
    fn test_aggregate_demand_counts_pool_edition_wide() {
        let ed = edition(Some(10));
        let a = distance(&ed, None, CapacityScope::SharedPool);
        let b = distance(&ed, None, CapacityScope::SharedPool);
        let c = distance(&ed, Some(3), CapacityScope::PerDistance);
        let demand = aggregate_demand([&a, &b, &b, &c]);
        assert_eq!(demand[&CapacityKey::SharedPool(ed.id)], 4);
        assert_eq!(demand[&CapacityKey::Distance(c.id)], 1);

        let per_distance_only = aggregate_demand([&c, &c]);
        assert_eq!(per_distance_only.len(), 1);
        assert_eq!(per_distance_only[&CapacityKey::Distance(c.id)], 2);
    }

    #[test]
    fn test_check_demand_reports_shortfall() {
        let key = CapacityKey::Distance(Uuid::new_v4());
        let demand = HashMap::from([(key, 3)]);

        let fits = HashMap::from([(key, (Some(5), 2))]);
        assert!(check_demand(&demand, &fits).is_ok());

        let short = HashMap::from([(key, (Some(5), 3))]);
        let err = check_demand(&demand, &short).unwrap_err();
        assert_eq!(err.requested, 3);
        assert_eq!(err.remaining, 2);

        let domain: DomainError = err.into();
        assert_eq!(domain.code, ErrorCode::InsufficientCapacity);
    }

    #[test]
    fn test_unbounded_capacity_always_fits() {
        let key = CapacityKey::SharedPool(Uuid::new_v4());
        let demand = HashMap::from([(key, 10_000)]);
        let limits = HashMap::from([(key, (None, 99_999))]);
        assert!(check_demand(&demand, &limits).is_ok());
    }
}
