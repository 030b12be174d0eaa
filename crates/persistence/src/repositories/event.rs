//! Repository for event catalogue reads and capacity counting.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::entities::{AddOnEntity, DistanceEntity, EventEditionEntity, PricingTierEntity};
use crate::metrics::QueryTimer;

/// SQL predicate selecting registrations that hold a capacity slot at `$now`.
///
/// Confirmed rows always count. Hold rows count only while unexpired. The
/// placeholder index for `now` is substituted by each caller.
macro_rules! reserved_predicate {
    ($now:literal) => {
        concat!(
            "r.deleted_at IS NULL AND (r.status = 'confirmed' OR ",
            "(r.status IN ('started', 'submitted', 'payment_pending') AND r.expires_at > ",
            $now,
            "))"
        )
    };
}

/// Repository for editions, distances, pricing tiers and add-ons.
#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_edition<'e, E>(
        executor: E,
        edition_id: Uuid,
    ) -> Result<Option<EventEditionEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let timer = QueryTimer::new("find_edition");
        let result = sqlx::query_as::<_, EventEditionEntity>(
            r#"
            SELECT id, name, shared_capacity, registration_opens_at, registration_closes_at
            FROM event_editions
            WHERE id = $1
            "#,
        )
        .bind(edition_id)
        .fetch_optional(executor)
        .await;
        timer.record();
        result
    }

    /// Locks the edition row for the rest of the transaction.
    ///
    /// Every capacity-consuming command takes this lock first, so
    /// check-then-insert against edition capacity is serialized.
    pub async fn lock_edition(
        conn: &mut PgConnection,
        edition_id: Uuid,
    ) -> Result<Option<EventEditionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("lock_edition");
        let result = sqlx::query_as::<_, EventEditionEntity>(
            r#"
            SELECT id, name, shared_capacity, registration_opens_at, registration_closes_at
            FROM event_editions
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(edition_id)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    pub async fn find_distance<'e, E>(
        executor: E,
        distance_id: Uuid,
    ) -> Result<Option<DistanceEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let timer = QueryTimer::new("find_distance");
        let result = sqlx::query_as::<_, DistanceEntity>(
            r#"
            SELECT id, edition_id, name, capacity, capacity_scope, price_cents
            FROM event_distances
            WHERE id = $1
            "#,
        )
        .bind(distance_id)
        .fetch_optional(executor)
        .await;
        timer.record();
        result
    }

    pub async fn list_distances<'e, E>(
        executor: E,
        edition_id: Uuid,
    ) -> Result<Vec<DistanceEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let timer = QueryTimer::new("list_distances");
        let result = sqlx::query_as::<_, DistanceEntity>(
            r#"
            SELECT id, edition_id, name, capacity, capacity_scope, price_cents
            FROM event_distances
            WHERE edition_id = $1
            ORDER BY name
            "#,
        )
        .bind(edition_id)
        .fetch_all(executor)
        .await;
        timer.record();
        result
    }

    pub async fn list_pricing_tiers<'e, E>(
        executor: E,
        distance_id: Uuid,
    ) -> Result<Vec<PricingTierEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let timer = QueryTimer::new("list_pricing_tiers");
        let result = sqlx::query_as::<_, PricingTierEntity>(
            r#"
            SELECT id, distance_id, label, price_cents, starts_at, ends_at
            FROM distance_pricing_tiers
            WHERE distance_id = $1
            ORDER BY starts_at NULLS FIRST
            "#,
        )
        .bind(distance_id)
        .fetch_all(executor)
        .await;
        timer.record();
        result
    }

    /// Lists active add-ons of an edition, both edition-wide and per-distance.
    pub async fn list_add_ons<'e, E>(
        executor: E,
        edition_id: Uuid,
    ) -> Result<Vec<AddOnEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let timer = QueryTimer::new("list_add_ons");
        let result = sqlx::query_as::<_, AddOnEntity>(
            r#"
            SELECT id, edition_id, distance_id, name, price_cents, is_active
            FROM event_add_ons
            WHERE edition_id = $1 AND is_active = TRUE
            ORDER BY name
            "#,
        )
        .bind(edition_id)
        .fetch_all(executor)
        .await;
        timer.record();
        result
    }

    /// Counts registrations holding a slot on one distance.
    pub async fn count_reserved_for_distance<'e, E>(
        executor: E,
        distance_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let timer = QueryTimer::new("count_reserved_for_distance");
        let result = sqlx::query_scalar::<_, i64>(concat!(
            "SELECT COUNT(*) FROM registrations r WHERE r.distance_id = $1 AND ",
            reserved_predicate!("$2")
        ))
        .bind(distance_id)
        .bind(now)
        .fetch_one(executor)
        .await;
        timer.record();
        result
    }

    /// Counts registrations holding a slot anywhere in the edition.
    pub async fn count_reserved_for_edition<'e, E>(
        executor: E,
        edition_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let timer = QueryTimer::new("count_reserved_for_edition");
        let result = sqlx::query_scalar::<_, i64>(concat!(
            "SELECT COUNT(*) FROM registrations r WHERE r.edition_id = $1 AND ",
            reserved_predicate!("$2")
        ))
        .bind(edition_id)
        .bind(now)
        .fetch_one(executor)
        .await;
        timer.record();
        result
    }

    /// Reserved counts grouped by distance for one edition.
    pub async fn reserved_counts_by_distance(
        &self,
        edition_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, i64)>, sqlx::Error> {
        let timer = QueryTimer::new("reserved_counts_by_distance");
        let result = sqlx::query_as::<_, (Uuid, i64)>(concat!(
            "SELECT r.distance_id, COUNT(*) FROM registrations r WHERE r.edition_id = $1 AND ",
            reserved_predicate!("$2"),
            " GROUP BY r.distance_id"
        ))
        .bind(edition_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}
