//! Registration invites for batch-created registrations.
//!
//! Only the SHA-256 of a token is stored; the raw token leaves the process
//! once, inside the invite email.

use chrono::{DateTime, Utc};
use domain::models::{
    AuditAction, BatchStatus, ClaimInviteResult, GroupRegistrationBatch,
    GroupRegistrationBatchRow, InviteStatus, IssueInvitesResult, Registration,
    RegistrationInvite, RegistrationStatus, PERMISSION_MANAGE_REGISTRATIONS,
};
use domain::services::{is_expired_hold, AuditLogBuilder, NotificationMessage, Notifier};
use domain::{DomainError, ErrorCode};
use persistence::repositories::{
    AuditLogRepository, EventRepository, GroupBatchRepository, InviteRepository,
    RegistrationRepository,
};
use shared::crypto::{generate_invite_token, hash_invite_token};
use shared::validation::normalize_email;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use super::{notify_best_effort, CommandContext, ServiceError, ServiceResult};

/// An invite committed to the database whose email is still to be sent.
struct OutgoingInvite {
    email: String,
    token: String,
}

#[derive(Clone)]
pub struct InviteService {
    pool: PgPool,
    notifier: Arc<dyn Notifier>,
    claim_base_url: String,
}

impl InviteService {
    pub fn new(pool: PgPool, notifier: Arc<dyn Notifier>, claim_base_url: impl Into<String>) -> Self {
        Self {
            pool,
            notifier,
            claim_base_url: claim_base_url.into(),
        }
    }

    pub fn claim_url(&self, token: &str) -> String {
        let separator = if self.claim_base_url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.claim_base_url, separator, token)
    }

    /// Issues one current invite per unclaimed registration of a processed batch.
    pub async fn issue_batch_invites(
        &self,
        ctx: &CommandContext,
        batch_id: Uuid,
    ) -> ServiceResult<IssueInvitesResult> {
        ctx.require_permission(PERMISSION_MANAGE_REGISTRATIONS)?;

        let mut tx = self.pool.begin().await?;
        let batch: GroupRegistrationBatch = GroupBatchRepository::lock_batch(&mut tx, batch_id)
            .await?
            .map(Into::into)
            .ok_or_else(|| DomainError::not_found("group batch not found"))?;
        if batch.status != BatchStatus::Processed {
            return Err(DomainError::invalid_state("invites need a processed batch").into());
        }
        let edition_name = edition_name(&mut tx, batch.edition_id).await?;

        let rows: Vec<GroupRegistrationBatchRow> = GroupBatchRepository::list_rows(&mut tx, batch.id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        let mut outgoing = Vec::new();
        let mut superseded = 0;
        for row in rows {
            let Some(registration_id) = row.created_registration_id else {
                continue;
            };
            let registration: Option<Registration> =
                RegistrationRepository::find_for_update(&mut tx, registration_id)
                    .await?
                    .map(Into::into);
            let Some(registration) = registration else {
                continue;
            };
            if registration.buyer_user_id.is_some() || registration.status.is_terminal() {
                continue;
            }

            let email = normalize_email(&row.raw.email);
            superseded += InviteRepository::supersede_current(&mut tx, batch.edition_id, &email).await?;
            let token = generate_invite_token();
            InviteRepository::insert(
                &mut tx,
                batch.edition_id,
                registration_id,
                &email,
                &hash_invite_token(&token),
                InviteStatus::Sent,
            )
            .await?;
            outgoing.push(OutgoingInvite { email, token });
        }

        let entry = AuditLogBuilder::user_action(ctx.user_id(), AuditAction::InviteIssue)
            .on_resource("group_batch", batch.id)
            .with_metadata("issued", outgoing.len())
            .with_metadata("superseded", superseded)
            .with_request_id(ctx.request_id.clone())
            .build();
        AuditLogRepository::insert(&mut tx, &entry).await?;
        tx.commit().await?;

        let issued = outgoing.len();
        for invite in outgoing {
            self.send_invite(&invite, &edition_name).await;
        }
        tracing::info!(batch_id = %batch_id, issued, superseded, "Batch invites issued");

        Ok(IssueInvitesResult { issued, superseded })
    }

    /// Rotates the token of a current, unclaimed invite.
    pub async fn resend_invite(
        &self,
        ctx: &CommandContext,
        invite_id: Uuid,
    ) -> ServiceResult<RegistrationInvite> {
        ctx.require_permission(PERMISSION_MANAGE_REGISTRATIONS)?;

        let mut tx = self.pool.begin().await?;
        let current: RegistrationInvite = InviteRepository::find_by_id_for_update(&mut tx, invite_id)
            .await?
            .map(Into::into)
            .ok_or_else(|| DomainError::not_found("invite not found"))?;
        ensure_claimable(&current)?;

        InviteRepository::supersede_current(&mut tx, current.edition_id, &current.email).await?;
        let token = generate_invite_token();
        let rotated: RegistrationInvite = InviteRepository::insert(
            &mut tx,
            current.edition_id,
            current.registration_id,
            &current.email,
            &hash_invite_token(&token),
            InviteStatus::Sent,
        )
        .await?
        .into();
        let edition_name = edition_name(&mut tx, current.edition_id).await?;
        tx.commit().await?;

        self.send_invite(
            &OutgoingInvite {
                email: rotated.email.clone(),
                token,
            },
            &edition_name,
        )
        .await;
        tracing::info!(invite_id = %rotated.id, replaced = %invite_id, "Invite resent");
        Ok(rotated)
    }

    pub async fn cancel_invite(&self, ctx: &CommandContext, invite_id: Uuid) -> ServiceResult<()> {
        ctx.require_permission(PERMISSION_MANAGE_REGISTRATIONS)?;

        let mut tx = self.pool.begin().await?;
        if !InviteRepository::cancel(&mut tx, invite_id).await? {
            let invite: RegistrationInvite = InviteRepository::find_by_id_for_update(&mut tx, invite_id)
                .await?
                .map(Into::into)
                .ok_or_else(|| DomainError::not_found("invite not found"))?;
            if invite.status != InviteStatus::Cancelled {
                return Err(DomainError::invalid_state(format!(
                    "invite is {}",
                    invite.status.as_str()
                ))
                .into());
            }
        }
        tx.commit().await?;

        tracing::info!(invite_id = %invite_id, "Invite cancelled");
        Ok(())
    }

    /// Makes the caller the buyer of the invited registration.
    ///
    /// Exactly one of any number of concurrent claims succeeds; the rest see
    /// `ALREADY_CLAIMED`. A lapsed hold retires the invite as `expired`.
    pub async fn claim_invite(
        &self,
        ctx: &CommandContext,
        token: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<ClaimInviteResult> {
        let token = token.trim();
        if token.is_empty() {
            return Err(DomainError::validation("token is required").into());
        }

        let mut tx = self.pool.begin().await?;
        let invite: RegistrationInvite =
            InviteRepository::find_by_token_hash_for_update(&mut tx, &hash_invite_token(token))
                .await?
                .map(Into::into)
                .ok_or_else(|| DomainError::not_found("invite not found"))?;
        ensure_claimable(&invite)?;

        let registration: Registration =
            RegistrationRepository::find_for_update(&mut tx, invite.registration_id)
                .await?
                .map(Into::into)
                .ok_or_else(|| DomainError::not_found("registration not found"))?;
        if registration.buyer_user_id.is_some() {
            return Err(already_claimed().into());
        }
        if registration.status == RegistrationStatus::Cancelled {
            return Err(DomainError::invalid_state("registration was cancelled").into());
        }
        if is_expired_hold(registration.status, registration.expires_at, now) {
            InviteRepository::mark_expired(&mut tx, invite.id).await?;
            tx.commit().await?;
            tracing::info!(invite_id = %invite.id, "Invite expired with its registration hold");
            return Err(DomainError::expired("registration hold has expired").into());
        }

        if !InviteRepository::claim(&mut tx, invite.id, ctx.user_id()).await? {
            return Err(ServiceError::LostRace(format!("claiming invite {}", invite.id)));
        }
        if !RegistrationRepository::claim_buyer(&mut tx, registration.id, ctx.user_id()).await? {
            return Err(ServiceError::LostRace(format!(
                "claiming registration {}",
                registration.id
            )));
        }

        let entry = AuditLogBuilder::user_action(ctx.user_id(), AuditAction::InviteClaim)
            .on_resource("registration_invite", invite.id)
            .with_metadata("registrationId", registration.id.to_string())
            .with_request_id(ctx.request_id.clone())
            .build();
        AuditLogRepository::insert(&mut tx, &entry).await?;
        tx.commit().await?;

        tracing::info!(
            invite_id = %invite.id,
            registration_id = %registration.id,
            user_id = %ctx.user_id(),
            "Invite claimed"
        );
        Ok(ClaimInviteResult {
            invite_id: invite.id,
            registration_id: registration.id,
        })
    }

    pub async fn list_for_registration(
        &self,
        registration_id: Uuid,
    ) -> ServiceResult<Vec<RegistrationInvite>> {
        Ok(InviteRepository::new(self.pool.clone())
            .list_for_registration(registration_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn send_invite(&self, invite: &OutgoingInvite, edition_name: &str) {
        let message = NotificationMessage::registration_invite(
            &invite.email,
            edition_name,
            &self.claim_url(&invite.token),
        );
        notify_best_effort(self.notifier.as_ref(), message).await;
    }
}

fn already_claimed() -> DomainError {
    DomainError::new(ErrorCode::AlreadyClaimed, "invite was already claimed")
}

fn ensure_claimable(invite: &RegistrationInvite) -> Result<(), DomainError> {
    match invite.status {
        InviteStatus::Claimed => Err(already_claimed()),
        status if status.is_claimable() && invite.is_current => Ok(()),
        status => Err(DomainError::invalid_state(format!(
            "invite is {}",
            status.as_str()
        ))),
    }
}

async fn edition_name(conn: &mut PgConnection, edition_id: Uuid) -> Result<String, ServiceError> {
    EventRepository::find_edition(&mut *conn, edition_id)
        .await?
        .map(|e| e.name)
        .ok_or_else(|| DomainError::not_found("edition not found").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::services::MockNotifier;

    fn invite(status: InviteStatus, is_current: bool) -> RegistrationInvite {
        RegistrationInvite {
            id: Uuid::new_v4(),
            edition_id: Uuid::new_v4(),
            registration_id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            status,
            is_current,
            sent_at: None,
            claimed_at: None,
            claimed_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_ensure_claimable() {
        assert!(ensure_claimable(&invite(InviteStatus::Sent, true)).is_ok());
        assert!(ensure_claimable(&invite(InviteStatus::Draft, true)).is_ok());
        assert_eq!(
            ensure_claimable(&invite(InviteStatus::Claimed, false))
                .unwrap_err()
                .code,
            ErrorCode::AlreadyClaimed
        );
        assert_eq!(
            ensure_claimable(&invite(InviteStatus::Sent, false))
                .unwrap_err()
                .code,
            ErrorCode::InvalidState
        );
        assert_eq!(
            ensure_claimable(&invite(InviteStatus::Superseded, false))
                .unwrap_err()
                .code,
            ErrorCode::InvalidState
        );
    }

    #[tokio::test]
    async fn test_claim_url() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let service = InviteService::new(
            pool.clone(),
            Arc::new(MockNotifier::new()),
            "https://race.example.com/claim",
        );
        assert_eq!(
            service.claim_url("abc"),
            "https://race.example.com/claim?token=abc"
        );

        let with_query = InviteService::new(
            pool,
            Arc::new(MockNotifier::new()),
            "https://race.example.com/claim?src=email",
        );
        assert_eq!(
            with_query.claim_url("abc"),
            "https://race.example.com/claim?src=email&token=abc"
        );
    }
}
