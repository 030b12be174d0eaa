//! Repository for registration groups, memberships and discount rules.

use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::entities::{GroupDiscountRuleEntity, GroupMemberEntity, RegistrationGroupEntity};
use crate::metrics::QueryTimer;

/// Repository for registration groups.
#[derive(Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a group with its creator as the first member.
    pub async fn create(
        &self,
        edition_id: Uuid,
        name: &str,
        created_by: Uuid,
    ) -> Result<RegistrationGroupEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_registration_group");
        let mut tx = self.pool.begin().await?;

        let group = sqlx::query_as::<_, RegistrationGroupEntity>(
            r#"
            INSERT INTO registration_groups (edition_id, name, created_by)
            VALUES ($1, $2, $3)
            RETURNING id, edition_id, name, created_by, created_at
            "#,
        )
        .bind(edition_id)
        .bind(name)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO registration_group_members (group_id, user_id)
            VALUES ($1, $2)
            "#,
        )
        .bind(group.id)
        .bind(created_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();
        Ok(group)
    }

    pub async fn find_by_id<'e, E>(
        executor: E,
        group_id: Uuid,
    ) -> Result<Option<RegistrationGroupEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, RegistrationGroupEntity>(
            r#"
            SELECT id, edition_id, name, created_by, created_at
            FROM registration_groups
            WHERE id = $1
            "#,
        )
        .bind(group_id)
        .fetch_optional(executor)
        .await
    }

    /// Locks the group row so discount syncs on one group run one at a time.
    pub async fn lock_group(
        conn: &mut PgConnection,
        group_id: Uuid,
    ) -> Result<Option<RegistrationGroupEntity>, sqlx::Error> {
        sqlx::query_as::<_, RegistrationGroupEntity>(
            r#"
            SELECT id, edition_id, name, created_by, created_at
            FROM registration_groups
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(group_id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Adds an active membership. Joining twice is a no-op.
    ///
    /// Returns `true` when a new membership was created.
    pub async fn join(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("join_registration_group");
        let result = sqlx::query(
            r#"
            INSERT INTO registration_group_members (group_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (group_id, user_id) WHERE left_at IS NULL DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
        timer.record();
        Ok(result.rows_affected() > 0)
    }

    /// Ends the user's active membership.
    pub async fn leave(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE registration_group_members
            SET left_at = NOW()
            WHERE group_id = $1 AND user_id = $2 AND left_at IS NULL
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_active_members<'e, E>(
        executor: E,
        group_id: Uuid,
    ) -> Result<Vec<GroupMemberEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, GroupMemberEntity>(
            r#"
            SELECT id, group_id, user_id, joined_at, left_at
            FROM registration_group_members
            WHERE group_id = $1 AND left_at IS NULL
            ORDER BY joined_at
            "#,
        )
        .bind(group_id)
        .fetch_all(executor)
        .await
    }

    /// Groups the user is currently an active member of, in id order.
    pub async fn list_active_group_ids_for_user<'e, E>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT group_id
            FROM registration_group_members
            WHERE user_id = $1 AND left_at IS NULL
            ORDER BY group_id
            "#,
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// Counts active members whose account is live and email-verified.
    pub async fn count_verified_members<'e, E>(
        executor: E,
        group_id: Uuid,
    ) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let timer = QueryTimer::new("count_verified_group_members");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM registration_group_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.group_id = $1
              AND m.left_at IS NULL
              AND u.email_verified = TRUE
              AND u.deleted_at IS NULL
            "#,
        )
        .bind(group_id)
        .fetch_one(executor)
        .await;
        timer.record();
        result
    }

    pub async fn list_active_rules<'e, E>(
        executor: E,
        edition_id: Uuid,
    ) -> Result<Vec<GroupDiscountRuleEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, GroupDiscountRuleEntity>(
            r#"
            SELECT id, edition_id, min_participants, percent_off, is_active
            FROM group_discount_rules
            WHERE edition_id = $1 AND is_active = TRUE
            ORDER BY min_participants DESC, percent_off DESC
            "#,
        )
        .bind(edition_id)
        .fetch_all(executor)
        .await
    }
}
