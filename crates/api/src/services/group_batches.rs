//! Bulk group registration: CSV ingestion and all-or-nothing processing.

use chrono::{DateTime, Utc};
use domain::models::{
    AddOn, AuditAction, BatchRowInput, BatchRowSummary, BatchStatus, CreateGroupBatchRequest,
    Distance, EventEdition, GroupRegistrationBatch, GroupRegistrationBatchRow, GroupBatchSummary,
    ParsedBatchRow, PricingTier, ProcessGroupBatchResult, RegistrantInput, RegistrationStatus,
    PERMISSION_MANAGE_REGISTRATIONS,
};
use domain::services::batch_rows::{group_batch_template_csv, parse_batch_csv, resolve_row};
use domain::services::group_discount::select_discount_rule;
use domain::services::{pricing, AuditLogBuilder, HoldPolicy};
use domain::DomainError;
use persistence::repositories::{
    AuditLogRepository, EventRepository, GroupBatchRepository, GroupRepository, NewRegistration,
    RegistrationRepository,
};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::groups::{active_rules, resolve_group_discount};
use super::registrations::ensure_capacity;
use super::{CommandContext, ServiceError, ServiceResult};
use crate::middleware::metrics::{record_group_batch_processed, record_registrations_created};

#[derive(Clone)]
pub struct GroupBatchService {
    pool: PgPool,
    hold_policy: HoldPolicy,
    fee_basis_points: i32,
    max_rows: usize,
}

impl GroupBatchService {
    pub fn new(pool: PgPool, hold_policy: HoldPolicy, fee_basis_points: i32, max_rows: usize) -> Self {
        Self {
            pool,
            hold_policy,
            fee_basis_points,
            max_rows,
        }
    }

    pub fn template_csv(&self) -> String {
        group_batch_template_csv()
    }

    /// Parses and stores an upload. Rows keep their validation errors; the
    /// batch is `validated` either way and processing rejects bad rows.
    pub async fn create_from_csv(
        &self,
        ctx: &CommandContext,
        edition_id: Uuid,
        request: CreateGroupBatchRequest,
    ) -> ServiceResult<GroupBatchSummary> {
        ctx.require_permission(PERMISSION_MANAGE_REGISTRATIONS)?;

        if EventRepository::find_edition(&self.pool, edition_id)
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("edition not found").into());
        }
        if let Some(group_id) = request.registration_group_id {
            GroupRepository::find_by_id(&self.pool, group_id)
                .await?
                .filter(|g| g.edition_id == edition_id)
                .ok_or_else(|| DomainError::not_found("registration group not found"))?;
        }

        let distances: Vec<Distance> = EventRepository::list_distances(&self.pool, edition_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        let add_ons: Vec<AddOn> = EventRepository::list_add_ons(&self.pool, edition_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        let rows = parse_batch_csv(&request.csv, self.max_rows, &distances, &add_ons)?;
        let batch: GroupRegistrationBatch = GroupBatchRepository::new(self.pool.clone())
            .create_with_rows(
                edition_id,
                ctx.user_id(),
                request.registration_group_id,
                request.payment_responsibility,
                &rows,
            )
            .await?
            .into();

        let summary = summarize(&batch, &rows);
        tracing::info!(
            batch_id = %batch.id,
            edition_id = %edition_id,
            rows = summary.row_count,
            invalid_rows = summary.invalid_row_count,
            "Group batch uploaded"
        );
        Ok(summary)
    }

    pub async fn get_batch(
        &self,
        batch_id: Uuid,
    ) -> ServiceResult<(GroupRegistrationBatch, Vec<GroupRegistrationBatchRow>)> {
        let repo = GroupBatchRepository::new(self.pool.clone());
        let batch: GroupRegistrationBatch = repo
            .find_by_id(batch_id)
            .await?
            .map(Into::into)
            .ok_or_else(|| DomainError::not_found("group batch not found"))?;
        let rows = repo
            .list_rows_for(batch_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        Ok((batch, rows))
    }

    /// Creates one registration per row, or none at all.
    ///
    /// A rejected batch is rolled back and then marked `failed` with
    /// `processedAt` on a separate transaction. Infrastructure errors leave
    /// the batch `validated` so it can be retried.
    pub async fn process_batch(
        &self,
        ctx: &CommandContext,
        batch_id: Uuid,
        now: DateTime<Utc>,
    ) -> ServiceResult<ProcessGroupBatchResult> {
        ctx.require_permission(PERMISSION_MANAGE_REGISTRATIONS)?;

        let mut tx = self.pool.begin().await?;
        let batch: GroupRegistrationBatch = GroupBatchRepository::lock_batch(&mut tx, batch_id)
            .await?
            .map(Into::into)
            .ok_or_else(|| DomainError::not_found("group batch not found"))?;
        if batch.status != BatchStatus::Validated {
            return Err(DomainError::invalid_state(format!(
                "group batch is already {}",
                batch.status
            ))
            .into());
        }

        match self.create_registrations(&mut tx, &batch, now).await {
            Ok(result) => {
                if !GroupBatchRepository::mark_status(&mut tx, batch.id, BatchStatus::Processed, None)
                    .await?
                {
                    return Err(ServiceError::LostRace(format!("processing batch {}", batch.id)));
                }
                let entry = AuditLogBuilder::user_action(ctx.user_id(), AuditAction::GroupBatchProcess)
                    .on_resource("group_batch", batch.id)
                    .with_metadata("createdCount", result.created_count)
                    .with_metadata("groupDiscountPercentOff", result.group_discount_percent_off)
                    .with_request_id(ctx.request_id.clone())
                    .build();
                AuditLogRepository::insert(&mut tx, &entry).await?;
                tx.commit().await?;

                record_registrations_created("group_batch", result.created_count as u64);
                record_group_batch_processed(BatchStatus::Processed.as_str());
                tracing::info!(
                    batch_id = %batch.id,
                    created = result.created_count,
                    percent_off = ?result.group_discount_percent_off,
                    "Group batch processed"
                );
                Ok(result)
            }
            Err(ServiceError::Domain(err)) => {
                tx.rollback().await?;
                self.record_failure(ctx, batch.id, &err).await?;
                Err(err.into())
            }
            Err(other) => {
                tx.rollback().await?;
                tracing::error!(batch_id = %batch.id, error = %other, "Group batch processing aborted");
                Err(other)
            }
        }
    }

    async fn create_registrations(
        &self,
        conn: &mut PgConnection,
        batch: &GroupRegistrationBatch,
        now: DateTime<Utc>,
    ) -> ServiceResult<ProcessGroupBatchResult> {
        let rows: Vec<GroupRegistrationBatchRow> = GroupBatchRepository::list_rows(conn, batch.id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        if rows.is_empty() {
            return Err(DomainError::validation("group batch has no rows").into());
        }
        if let Some(bad) = rows.iter().find(|r| !r.is_valid()) {
            return Err(DomainError::validation(format!(
                "row {}: {}",
                bad.row_index + 1,
                bad.validation_errors.join("; ")
            ))
            .into());
        }

        let edition: EventEdition = EventRepository::lock_edition(conn, batch.edition_id)
            .await?
            .map(Into::into)
            .ok_or_else(|| DomainError::not_found("edition not found"))?;
        let distances: Vec<Distance> = EventRepository::list_distances(&mut *conn, edition.id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        let add_ons: Vec<AddOn> = EventRepository::list_add_ons(&mut *conn, edition.id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        let mut resolved = Vec::with_capacity(rows.len());
        for row in &rows {
            let (distance, selected) = resolve_row(&row.raw, &distances, &add_ons).map_err(|e| {
                DomainError::validation(format!("row {}: {}", row.row_index + 1, e.message))
            })?;
            resolved.push((row, distance, selected));
        }

        let demand: Vec<&Distance> = resolved.iter().map(|(_, d, _)| *d).collect();
        ensure_capacity(conn, &edition, &demand, now).await?;

        let discount = match batch.registration_group_id {
            Some(group_id) => resolve_group_discount(conn, group_id, edition.id).await?,
            None => {
                let rules = active_rules(conn, edition.id).await?;
                select_discount_rule(&rules, rows.len() as i64)
            }
        };
        let percent_off = discount.map(|d| d.percent_off);

        let mut tiers: HashMap<Uuid, Vec<PricingTier>> = HashMap::new();
        let expires_at = self
            .hold_policy
            .compute_expires_at(now, RegistrationStatus::Started);

        for (row, distance, selected) in &resolved {
            if !tiers.contains_key(&distance.id) {
                let loaded = EventRepository::list_pricing_tiers(&mut *conn, distance.id)
                    .await?
                    .into_iter()
                    .map(Into::into)
                    .collect();
                tiers.insert(distance.id, loaded);
            }
            let distance_tiers = tiers.get(&distance.id).map(Vec::as_slice).unwrap_or_default();

            let price = pricing::compute_price(
                pricing::select_base_price(distance, distance_tiers, now),
                pricing::add_ons_total(selected),
                percent_off,
                self.fee_basis_points,
            );
            let new = NewRegistration {
                edition_id: edition.id,
                distance_id: distance.id,
                buyer_user_id: None,
                registration_group_id: batch.registration_group_id,
                status: RegistrationStatus::Started,
                expires_at,
                price,
                payment_responsibility: batch.payment_responsibility,
            };
            let registration = RegistrationRepository::insert(conn, &new).await?;
            RegistrationRepository::upsert_registrant(conn, registration.id, &registrant_from_row(&row.raw))
                .await?;
            for add_on in selected {
                RegistrationRepository::insert_add_on_selection(
                    conn,
                    registration.id,
                    add_on.id,
                    add_on.price_cents,
                )
                .await?;
            }
            GroupBatchRepository::link_row(conn, row.id, registration.id).await?;
        }

        Ok(ProcessGroupBatchResult {
            status: BatchStatus::Processed,
            created_count: resolved.len(),
            group_discount_percent_off: percent_off,
        })
    }

    async fn record_failure(
        &self,
        ctx: &CommandContext,
        batch_id: Uuid,
        err: &DomainError,
    ) -> ServiceResult<()> {
        let mut tx = self.pool.begin().await?;
        let marked =
            GroupBatchRepository::mark_status(&mut tx, batch_id, BatchStatus::Failed, Some(err.code.as_str()))
                .await?;
        if marked {
            let entry = AuditLogBuilder::user_action(ctx.user_id(), AuditAction::GroupBatchFail)
                .on_resource("group_batch", batch_id)
                .with_metadata("code", err.code.as_str())
                .with_metadata("message", err.message.clone())
                .with_request_id(ctx.request_id.clone())
                .build();
            AuditLogRepository::insert(&mut tx, &entry).await?;
        }
        tx.commit().await?;

        record_group_batch_processed(BatchStatus::Failed.as_str());
        tracing::warn!(
            batch_id = %batch_id,
            code = %err.code,
            message = %err.message,
            "Group batch failed"
        );
        Ok(())
    }
}

fn registrant_from_row(raw: &BatchRowInput) -> RegistrantInput {
    RegistrantInput {
        first_name: raw.first_name.clone(),
        last_name: raw.last_name.clone(),
        email: raw.email.clone(),
        date_of_birth: raw.date_of_birth,
        phone: raw.phone.clone(),
    }
}

fn summarize(batch: &GroupRegistrationBatch, rows: &[ParsedBatchRow]) -> GroupBatchSummary {
    let invalid: Vec<BatchRowSummary> = rows
        .iter()
        .filter(|r| !r.errors.is_empty())
        .map(|r| BatchRowSummary {
            row_index: r.row_index,
            errors: r.errors.clone(),
        })
        .collect();
    GroupBatchSummary {
        batch_id: batch.id,
        status: batch.status,
        row_count: rows.len(),
        invalid_row_count: invalid.len(),
        rows: invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::PaymentResponsibility;

    fn parsed(index: i32, errors: &[&str]) -> ParsedBatchRow {
        ParsedBatchRow {
            row_index: index,
            raw: BatchRowInput {
                distance: "10K".into(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: format!("ada{}@example.com", index),
                ..Default::default()
            },
            errors: errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn test_summarize_lists_only_invalid_rows() {
        let now = Utc::now();
        let batch = GroupRegistrationBatch {
            id: Uuid::new_v4(),
            edition_id: Uuid::new_v4(),
            uploaded_by: None,
            registration_group_id: None,
            payment_responsibility: PaymentResponsibility::CentralPay,
            status: BatchStatus::Validated,
            error_code: None,
            row_count: 3,
            processed_at: None,
            created_at: now,
        };
        let rows = vec![
            parsed(0, &[]),
            parsed(1, &["email is required"]),
            parsed(2, &[]),
        ];
        let summary = summarize(&batch, &rows);
        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.invalid_row_count, 1);
        assert_eq!(summary.rows[0].row_index, 1);
    }

    #[test]
    fn test_registrant_from_row() {
        let row = parsed(4, &[]);
        let registrant = registrant_from_row(&row.raw);
        assert_eq!(registrant.email, "ada4@example.com");
        assert_eq!(registrant.first_name, "Ada");
        assert!(registrant.phone.is_none());
    }
}
