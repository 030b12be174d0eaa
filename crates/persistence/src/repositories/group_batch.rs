//! Repository for group registration batches and their rows.

use domain::models::{BatchStatus, ParsedBatchRow, PaymentResponsibility};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::{GroupBatchEntity, GroupBatchRowEntity};
use crate::metrics::QueryTimer;

const BATCH_COLUMNS: &str = r#"
    id, edition_id, uploaded_by, registration_group_id, payment_responsibility, status,
    error_code, row_count, processed_at, created_at
"#;

const ROW_COLUMNS: &str =
    "id, batch_id, row_index, raw_json, validation_errors, created_registration_id";

/// Repository for group registration batches.
#[derive(Clone)]
pub struct GroupBatchRepository {
    pool: PgPool,
}

impl GroupBatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stores a validated batch and all of its parsed rows in one transaction.
    pub async fn create_with_rows(
        &self,
        edition_id: Uuid,
        uploaded_by: Uuid,
        registration_group_id: Option<Uuid>,
        payment_responsibility: PaymentResponsibility,
        rows: &[ParsedBatchRow],
    ) -> Result<GroupBatchEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_group_batch");
        let mut tx = self.pool.begin().await?;

        let batch = sqlx::query_as::<_, GroupBatchEntity>(&format!(
            r#"
            INSERT INTO group_registration_batches (
                edition_id, uploaded_by, registration_group_id, payment_responsibility,
                status, row_count
            )
            VALUES ($1, $2, $3, $4, 'validated', $5)
            RETURNING {}
            "#,
            BATCH_COLUMNS
        ))
        .bind(edition_id)
        .bind(uploaded_by)
        .bind(registration_group_id)
        .bind(payment_responsibility.as_str())
        .bind(rows.len() as i32)
        .fetch_one(&mut *tx)
        .await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO group_registration_batch_rows (batch_id, row_index, raw_json, validation_errors)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(batch.id)
            .bind(row.row_index)
            .bind(Json(&row.raw))
            .bind(Json(&row.errors))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        timer.record();
        Ok(batch)
    }

    pub async fn find_by_id(&self, batch_id: Uuid) -> Result<Option<GroupBatchEntity>, sqlx::Error> {
        sqlx::query_as::<_, GroupBatchEntity>(&format!(
            "SELECT {} FROM group_registration_batches WHERE id = $1",
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Loads the batch and locks it; concurrent processors queue here.
    pub async fn lock_batch(
        conn: &mut PgConnection,
        batch_id: Uuid,
    ) -> Result<Option<GroupBatchEntity>, sqlx::Error> {
        sqlx::query_as::<_, GroupBatchEntity>(&format!(
            "SELECT {} FROM group_registration_batches WHERE id = $1 FOR UPDATE",
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .fetch_optional(&mut *conn)
        .await
    }

    pub async fn list_rows(
        conn: &mut PgConnection,
        batch_id: Uuid,
    ) -> Result<Vec<GroupBatchRowEntity>, sqlx::Error> {
        sqlx::query_as::<_, GroupBatchRowEntity>(&format!(
            "SELECT {} FROM group_registration_batch_rows WHERE batch_id = $1 ORDER BY row_index",
            ROW_COLUMNS
        ))
        .bind(batch_id)
        .fetch_all(&mut *conn)
        .await
    }

    pub async fn list_rows_for(&self, batch_id: Uuid) -> Result<Vec<GroupBatchRowEntity>, sqlx::Error> {
        sqlx::query_as::<_, GroupBatchRowEntity>(&format!(
            "SELECT {} FROM group_registration_batch_rows WHERE batch_id = $1 ORDER BY row_index",
            ROW_COLUMNS
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Links a row to the registration it produced.
    pub async fn link_row(
        conn: &mut PgConnection,
        row_id: Uuid,
        registration_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE group_registration_batch_rows
            SET created_registration_id = $2
            WHERE id = $1
            "#,
        )
        .bind(row_id)
        .bind(registration_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Finalizes a batch; guarded so a batch leaves `validated` exactly once.
    pub async fn mark_status(
        conn: &mut PgConnection,
        batch_id: Uuid,
        status: BatchStatus,
        error_code: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE group_registration_batches
            SET status = $2, error_code = $3, processed_at = NOW()
            WHERE id = $1 AND status = 'validated'
            "#,
        )
        .bind(batch_id)
        .bind(status.as_str())
        .bind(error_code)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
