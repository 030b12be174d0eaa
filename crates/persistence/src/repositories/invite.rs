//! Repository for registration invites.

use domain::models::InviteStatus;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::RegistrationInviteEntity;
use crate::metrics::QueryTimer;

const INVITE_COLUMNS: &str = r#"
    id, edition_id, registration_id, email, token_hash, status, is_current,
    sent_at, claimed_at, claimed_by, created_at
"#;

/// Repository for registration invite operations.
#[derive(Clone)]
pub struct InviteRepository {
    pool: PgPool,
}

impl InviteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Retires every current invite for `(edition, email)`.
    ///
    /// Unclaimed ones become `superseded`; claimed or cancelled ones only lose
    /// their current flag. Returns how many rows were retired.
    pub async fn supersede_current(
        conn: &mut PgConnection,
        edition_id: Uuid,
        email: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE registration_invites
            SET is_current = FALSE,
                status = CASE WHEN status IN ('draft', 'sent') THEN 'superseded' ELSE status END,
                updated_at = NOW()
            WHERE edition_id = $1 AND LOWER(email) = LOWER($2) AND is_current
            "#,
        )
        .bind(edition_id)
        .bind(email)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Inserts a new current invite. Only the token hash is stored.
    pub async fn insert(
        conn: &mut PgConnection,
        edition_id: Uuid,
        registration_id: Uuid,
        email: &str,
        token_hash: &str,
        status: InviteStatus,
    ) -> Result<RegistrationInviteEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_registration_invite");
        let result = sqlx::query_as::<_, RegistrationInviteEntity>(&format!(
            r#"
            INSERT INTO registration_invites (
                edition_id, registration_id, email, token_hash, status, is_current, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, TRUE, CASE WHEN $5 = 'sent' THEN NOW() END)
            RETURNING {}
            "#,
            INVITE_COLUMNS
        ))
        .bind(edition_id)
        .bind(registration_id)
        .bind(email)
        .bind(token_hash)
        .bind(status.as_str())
        .fetch_one(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Loads an invite by token hash and locks it.
    pub async fn find_by_token_hash_for_update(
        conn: &mut PgConnection,
        token_hash: &str,
    ) -> Result<Option<RegistrationInviteEntity>, sqlx::Error> {
        sqlx::query_as::<_, RegistrationInviteEntity>(&format!(
            "SELECT {} FROM registration_invites WHERE token_hash = $1 FOR UPDATE",
            INVITE_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(&mut *conn)
        .await
    }

    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        invite_id: Uuid,
    ) -> Result<Option<RegistrationInviteEntity>, sqlx::Error> {
        sqlx::query_as::<_, RegistrationInviteEntity>(&format!(
            "SELECT {} FROM registration_invites WHERE id = $1 FOR UPDATE",
            INVITE_COLUMNS
        ))
        .bind(invite_id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Marks an invite claimed, guarded on it still being claimable and current.
    pub async fn claim(
        conn: &mut PgConnection,
        invite_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE registration_invites
            SET status = 'claimed', claimed_at = NOW(), claimed_by = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('draft', 'sent') AND is_current
            "#,
        )
        .bind(invite_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Retires an invite whose registration hold has lapsed.
    pub async fn mark_expired(conn: &mut PgConnection, invite_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE registration_invites
            SET status = 'expired', is_current = FALSE, updated_at = NOW()
            WHERE id = $1 AND status IN ('draft', 'sent')
            "#,
        )
        .bind(invite_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Cancels one unclaimed invite. Returns false if it was not claimable.
    pub async fn cancel(conn: &mut PgConnection, invite_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE registration_invites
            SET status = 'cancelled', is_current = FALSE, updated_at = NOW()
            WHERE id = $1 AND status IN ('draft', 'sent')
            "#,
        )
        .bind(invite_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancels the current invites attached to a registration.
    pub async fn cancel_for_registration(
        conn: &mut PgConnection,
        registration_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE registration_invites
            SET status = 'cancelled', is_current = FALSE, updated_at = NOW()
            WHERE registration_id = $1 AND status IN ('draft', 'sent')
            "#,
        )
        .bind(registration_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_for_registration(
        &self,
        registration_id: Uuid,
    ) -> Result<Vec<RegistrationInviteEntity>, sqlx::Error> {
        sqlx::query_as::<_, RegistrationInviteEntity>(&format!(
            "SELECT {} FROM registration_invites WHERE registration_id = $1 ORDER BY created_at",
            INVITE_COLUMNS
        ))
        .bind(registration_id)
        .fetch_all(&self.pool)
        .await
    }
}
