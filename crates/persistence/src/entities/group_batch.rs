//! Group registration batch entities.

use chrono::{DateTime, Utc};
use domain::models::{
    BatchRowInput, BatchStatus, GroupRegistrationBatch, GroupRegistrationBatchRow,
    PaymentResponsibility,
};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct GroupBatchEntity {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub registration_group_id: Option<Uuid>,
    pub payment_responsibility: String,
    pub status: String,
    pub error_code: Option<String>,
    pub row_count: i32,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<GroupBatchEntity> for GroupRegistrationBatch {
    fn from(entity: GroupBatchEntity) -> Self {
        Self {
            id: entity.id,
            edition_id: entity.edition_id,
            uploaded_by: entity.uploaded_by,
            registration_group_id: entity.registration_group_id,
            payment_responsibility: entity
                .payment_responsibility
                .parse()
                .unwrap_or(PaymentResponsibility::SelfPay),
            // Unknown statuses are never processable.
            status: entity.status.parse().unwrap_or(BatchStatus::Failed),
            error_code: entity.error_code,
            row_count: entity.row_count,
            processed_at: entity.processed_at,
            created_at: entity.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GroupBatchRowEntity {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub row_index: i32,
    pub raw_json: Json<BatchRowInput>,
    pub validation_errors: Json<Vec<String>>,
    pub created_registration_id: Option<Uuid>,
}

impl From<GroupBatchRowEntity> for GroupRegistrationBatchRow {
    fn from(entity: GroupBatchRowEntity) -> Self {
        Self {
            id: entity.id,
            batch_id: entity.batch_id,
            row_index: entity.row_index,
            raw: entity.raw_json.0,
            validation_errors: entity.validation_errors.0,
            created_registration_id: entity.created_registration_id,
        }
    }
}
