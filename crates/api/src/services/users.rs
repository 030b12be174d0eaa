//! Account events and hygiene.

use chrono::{DateTime, Utc};
use domain::models::{
    AuditAction, EmailVerificationResult, UnverifiedCleanupReport, PERMISSION_MANAGE_USERS,
};
use domain::services::AuditLogBuilder;
use domain::DomainError;
use persistence::repositories::{AuditLogRepository, GroupRepository, UserRepository};
use sqlx::PgPool;
use uuid::Uuid;

use super::groups::sync_open_registrations;
use super::{CommandContext, ServiceResult};

#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records that `user_id` verified their email, then upgrades the open
    /// registrations of every group the user belongs to, since the user now
    /// counts toward the group's discount tier.
    ///
    /// Repeating the call re-runs the sync and reports `newly_verified: false`.
    pub async fn mark_email_verified(
        &self,
        ctx: &CommandContext,
        user_id: Uuid,
    ) -> ServiceResult<EmailVerificationResult> {
        ctx.require_permission(PERMISSION_MANAGE_USERS)?;

        let mut tx = self.pool.begin().await?;
        if UserRepository::find_by_id(&mut *tx, user_id).await?.is_none() {
            return Err(DomainError::not_found("user not found").into());
        }
        let newly_verified = UserRepository::mark_email_verified(&mut tx, user_id).await?;

        let mut repriced = 0;
        for group_id in GroupRepository::list_active_group_ids_for_user(&mut *tx, user_id).await? {
            let Some(group) = GroupRepository::lock_group(&mut tx, group_id).await? else {
                continue;
            };
            repriced += sync_open_registrations(&mut tx, group.id, group.edition_id).await?;
        }

        if newly_verified {
            let entry = AuditLogBuilder::user_action(ctx.user_id(), AuditAction::UserEmailVerify)
                .on_resource("user", user_id)
                .with_metadata("registrationsRepriced", repriced as u64)
                .with_request_id(ctx.request_id.clone())
                .build();
            AuditLogRepository::insert(&mut tx, &entry).await?;
        }
        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            newly_verified,
            registrations_repriced = repriced,
            "Email verification recorded"
        );
        Ok(EmailVerificationResult {
            user_id,
            newly_verified,
            registrations_repriced: repriced,
        })
    }

    /// Deletes accounts that never verified their email and were created
    /// before `cutoff`, together with the rows they own.
    pub async fn cleanup_unverified_users(
        &self,
        cutoff: DateTime<Utc>,
    ) -> ServiceResult<UnverifiedCleanupReport> {
        let mut tx = self.pool.begin().await?;
        let counts = UserRepository::purge_unverified(&mut tx, cutoff).await?;

        if counts.deleted > 0 {
            let entry = AuditLogBuilder::system_action(AuditAction::UserPurgeUnverified)
                .with_metadata("cutoff", cutoff.to_rfc3339())
                .with_metadata("candidates", counts.candidates)
                .with_metadata("deleted", counts.deleted)
                .build();
            AuditLogRepository::insert(&mut tx, &entry).await?;
        }
        tx.commit().await?;

        Ok(UnverifiedCleanupReport {
            cutoff,
            candidates: counts.candidates,
            deleted: counts.deleted,
        })
    }
}
