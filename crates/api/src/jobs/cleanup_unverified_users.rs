//! Purges accounts that never verified their email.

use chrono::{Duration, Utc};
use tracing::info;

use super::scheduler::{Job, JobFrequency};
use crate::services::UserService;

pub struct CleanupUnverifiedUsersJob {
    users: UserService,
    retention: Duration,
}

impl CleanupUnverifiedUsersJob {
    pub fn new(users: UserService, retention_hours: i64) -> Self {
        Self {
            users,
            retention: Duration::hours(retention_hours.max(1)),
        }
    }
}

#[async_trait::async_trait]
impl Job for CleanupUnverifiedUsersJob {
    fn name(&self) -> &'static str {
        "cleanup_unverified_users"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Hourly
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let cutoff = Utc::now() - self.retention;
        let report = self.users.cleanup_unverified_users(cutoff).await?;
        if report.deleted > 0 {
            info!(
                cutoff = %report.cutoff,
                candidates = report.candidates,
                deleted = report.deleted,
                "Purged unverified users"
            );
        }
        Ok(())
    }
}
