//! Audit log repository.
//!
//! Entries are written on the caller's connection so they commit or roll
//! back with the mutation they describe.

use domain::models::CreateAuditLogInput;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::AuditLogEntity;
use crate::metrics::QueryTimer;

#[derive(Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        conn: &mut PgConnection,
        input: &CreateAuditLogInput,
    ) -> Result<Uuid, sqlx::Error> {
        let timer = QueryTimer::new("insert_audit_log");
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO audit_logs (
                actor_id, actor_type, action, resource_type, resource_id, metadata, request_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(input.actor_id)
        .bind(input.actor_type.as_str())
        .bind(input.action.as_str())
        .bind(&input.resource_type)
        .bind(input.resource_id.as_deref())
        .bind(input.metadata.as_ref())
        .bind(input.request_id.as_deref())
        .fetch_one(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Lists entries for one resource, newest first.
    pub async fn list_for_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Vec<AuditLogEntity>, sqlx::Error> {
        sqlx::query_as::<_, AuditLogEntity>(
            r#"
            SELECT id, actor_id, actor_type, action, resource_type, resource_id, metadata,
                   request_id, created_at
            FROM audit_logs
            WHERE resource_type = $1 AND resource_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(resource_type)
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await
    }
}
