//! User account models for verification and hygiene jobs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Outcome of purging unverified accounts created before `cutoff`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnverifiedCleanupReport {
    pub cutoff: DateTime<Utc>,
    pub candidates: u64,
    pub deleted: u64,
}

/// Outcome of recording a verified email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailVerificationResult {
    pub user_id: Uuid,
    /// `false` when the email was already verified.
    pub newly_verified: bool,
    pub registrations_repriced: usize,
}
