//! Repository for user accounts.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::entities::UserEntity;
use crate::metrics::QueryTimer;

const USER_COLUMNS: &str =
    "id, email, display_name, email_verified, email_verified_at, created_at, updated_at, deleted_at";

/// Outcome of one unverified-account purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeCounts {
    pub candidates: u64,
    pub deleted: u64,
}

pub struct UserRepository;

impl UserRepository {
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<UserEntity>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let timer = QueryTimer::new("find_user_by_id");
        let result = sqlx::query_as::<_, UserEntity>(&format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(executor)
        .await;
        timer.record();
        result
    }

    /// Marks a user's email as verified.
    ///
    /// Returns `true` when this call flipped the flag.
    pub async fn mark_email_verified(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("mark_user_email_verified");
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email_verified = TRUE, email_verified_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND email_verified = FALSE AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;
        timer.record();
        Ok(result.rows_affected() > 0)
    }

    /// Hard-deletes unverified accounts created before `cutoff`.
    ///
    /// Rows owned by the account are removed first; loose references such as
    /// contact submissions are detached. Candidates already locked by a
    /// concurrent purge are skipped.
    pub async fn purge_unverified(
        conn: &mut PgConnection,
        cutoff: DateTime<Utc>,
    ) -> Result<PurgeCounts, sqlx::Error> {
        let timer = QueryTimer::new("purge_unverified_users");

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM users
            WHERE email_verified = FALSE AND created_at < $1
            ORDER BY created_at
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(cutoff)
        .fetch_all(&mut *conn)
        .await?;

        if ids.is_empty() {
            timer.record();
            return Ok(PurgeCounts::default());
        }
        tracing::debug!(candidates = ids.len(), cutoff = %cutoff, "Purging unverified users");

        sqlx::query("DELETE FROM email_verification_tokens WHERE user_id = ANY($1)")
            .bind(&ids)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM registration_group_members WHERE user_id = ANY($1)")
            .bind(&ids)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM billing_subscriptions WHERE user_id = ANY($1)")
            .bind(&ids)
            .execute(&mut *conn)
            .await?;
        sqlx::query("UPDATE contact_submissions SET user_id = NULL WHERE user_id = ANY($1)")
            .bind(&ids)
            .execute(&mut *conn)
            .await?;

        let deleted = sqlx::query("DELETE FROM users WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        timer.record();
        Ok(PurgeCounts {
            candidates: ids.len() as u64,
            deleted,
        })
    }
}
