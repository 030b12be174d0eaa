//! Group registration batch models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::registration::PaymentResponsibility;

/// Processing status of an uploaded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Validated,
    Processed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validated" => Ok(Self::Validated),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown batch status: {}", s)),
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bulk registration upload for one edition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRegistrationBatch {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub registration_group_id: Option<Uuid>,
    pub payment_responsibility: PaymentResponsibility,
    pub status: BatchStatus,
    pub error_code: Option<String>,
    pub row_count: i32,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Participant data carried by one batch row, stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRowInput {
    /// Distance name or id as entered in the upload.
    pub distance: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
    /// Add-on names or ids.
    #[serde(default)]
    pub add_ons: Vec<String>,
}

/// One row of a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRegistrationBatchRow {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub row_index: i32,
    pub raw: BatchRowInput,
    pub validation_errors: Vec<String>,
    pub created_registration_id: Option<Uuid>,
}

impl GroupRegistrationBatchRow {
    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }
}

/// A row parsed and validated from an upload, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBatchRow {
    pub row_index: i32,
    pub raw: BatchRowInput,
    pub errors: Vec<String>,
}

/// Outcome of a successful `process` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroupBatchResult {
    pub status: BatchStatus,
    pub created_count: usize,
    pub group_discount_percent_off: Option<i32>,
}

/// Upload request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupBatchRequest {
    pub csv: String,
    #[serde(default)]
    pub payment_responsibility: PaymentResponsibility,
    pub registration_group_id: Option<Uuid>,
}

/// Summary returned after an upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBatchSummary {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub row_count: usize,
    pub invalid_row_count: usize,
    pub rows: Vec<BatchRowSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRowSummary {
    pub row_index: i32,
    pub errors: Vec<String>,
}
