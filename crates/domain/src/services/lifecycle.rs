//! Registration lifecycle transition rules.
//!
//! Pure checks only. The caller applies an accepted transition with an
//! update guarded on the status it planned from.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{Registration, RegistrationStatus};
use crate::services::hold_policy::is_expired_hold;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Submit,
    BeginPayment,
    CompleteDemoPayment,
    Cancel,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::BeginPayment => "begin_payment",
            Self::CompleteDemoPayment => "complete_demo_payment",
            Self::Cancel => "cancel",
        }
    }
}

/// What the caller should do for a requested action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Move from `from` to `to`; the update must be guarded on `from`.
    Apply {
        from: RegistrationStatus,
        to: RegistrationStatus,
    },
    /// The target state was already reached; do nothing.
    AlreadyDone,
}

/// Decides whether `action` may run on a registration currently in `current`.
///
/// Status is checked before expiry, so a lapsed hold in the wrong status is
/// reported as `INVALID_STATE`. Cancelling never checks expiry.
pub fn plan_transition(
    action: LifecycleAction,
    current: RegistrationStatus,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, DomainError> {
    use RegistrationStatus as S;

    let (from, to) = match (action, current) {
        (LifecycleAction::Submit, S::Started) => (S::Started, S::Submitted),
        (LifecycleAction::BeginPayment, S::Submitted) => (S::Submitted, S::PaymentPending),
        (LifecycleAction::CompleteDemoPayment, S::Confirmed) => {
            return Ok(TransitionPlan::AlreadyDone)
        }
        (LifecycleAction::CompleteDemoPayment, S::PaymentPending) => {
            (S::PaymentPending, S::Confirmed)
        }
        (LifecycleAction::Cancel, S::Cancelled) => return Ok(TransitionPlan::AlreadyDone),
        (LifecycleAction::Cancel, from) if from.is_hold() => {
            return Ok(TransitionPlan::Apply {
                from,
                to: S::Cancelled,
            })
        }
        (action, current) => {
            return Err(DomainError::invalid_state(format!(
                "cannot {} a registration in status {}",
                action.as_str(),
                current
            )))
        }
    };

    if is_expired_hold(from, expires_at, now) {
        return Err(DomainError::expired("registration hold has expired"));
    }

    Ok(TransitionPlan::Apply { from, to })
}

/// Resolves the caller's own registration.
///
/// A missing registration is `NOT_FOUND`; one owned by somebody else, or not
/// yet claimed, is `FORBIDDEN`.
pub fn ensure_owner(
    registration: Option<Registration>,
    user_id: Uuid,
) -> Result<Registration, DomainError> {
    let registration =
        registration.ok_or_else(|| DomainError::not_found("registration not found"))?;
    if registration.buyer_user_id != Some(user_id) {
        return Err(DomainError::forbidden(
            "registration belongs to another user",
        ));
    }
    Ok(registration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::models::PaymentResponsibility;
    use chrono::Duration;

    fn later() -> Option<DateTime<Utc>> {
        Some(Utc::now() + Duration::minutes(10))
    }

    fn lapsed() -> Option<DateTime<Utc>> {
        Some(Utc::now() - Duration::minutes(1))
    }

    #[test]
    fn test_forward_transitions() {
        let now = Utc::now();
        assert_eq!(
            plan_transition(LifecycleAction::Submit, RegistrationStatus::Started, later(), now),
            Ok(TransitionPlan::Apply {
                from: RegistrationStatus::Started,
                to: RegistrationStatus::Submitted
            })
        );
        assert_eq!(
            plan_transition(LifecycleAction::BeginPayment, RegistrationStatus::Submitted, later(), now),
            Ok(TransitionPlan::Apply {
                from: RegistrationStatus::Submitted,
                to: RegistrationStatus::PaymentPending
            })
        );
        assert_eq!(
            plan_transition(
                LifecycleAction::CompleteDemoPayment,
                RegistrationStatus::PaymentPending,
                later(),
                now
            ),
            Ok(TransitionPlan::Apply {
                from: RegistrationStatus::PaymentPending,
                to: RegistrationStatus::Confirmed
            })
        );
    }

    #[test]
    fn test_demo_completion_only_from_payment_pending() {
        let now = Utc::now();
        for status in [
            RegistrationStatus::Started,
            RegistrationStatus::Submitted,
            RegistrationStatus::Cancelled,
        ] {
            let err = plan_transition(LifecycleAction::CompleteDemoPayment, status, later(), now)
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidState);
        }
    }

    #[test]
    fn test_demo_completion_is_idempotent_once_confirmed() {
        assert_eq!(
            plan_transition(
                LifecycleAction::CompleteDemoPayment,
                RegistrationStatus::Confirmed,
                None,
                Utc::now()
            ),
            Ok(TransitionPlan::AlreadyDone)
        );
    }

    #[test]
    fn test_lapsed_hold_is_expired_not_confirmed() {
        let err = plan_transition(
            LifecycleAction::CompleteDemoPayment,
            RegistrationStatus::PaymentPending,
            lapsed(),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::RegistrationExpired);

        let err = plan_transition(
            LifecycleAction::Submit,
            RegistrationStatus::Started,
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::RegistrationExpired);
    }

    #[test]
    fn test_cancel_rules() {
        let now = Utc::now();
        assert_eq!(
            plan_transition(LifecycleAction::Cancel, RegistrationStatus::Cancelled, None, now),
            Ok(TransitionPlan::AlreadyDone)
        );
        assert_eq!(
            plan_transition(LifecycleAction::Cancel, RegistrationStatus::Submitted, lapsed(), now),
            Ok(TransitionPlan::Apply {
                from: RegistrationStatus::Submitted,
                to: RegistrationStatus::Cancelled
            })
        );
        let err = plan_transition(LifecycleAction::Cancel, RegistrationStatus::Confirmed, None, now)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidState);
    }

    fn registration(buyer: Option<Uuid>) -> Registration {
        let now = Utc::now();
        Registration {
            id: Uuid::new_v4(),
            edition_id: Uuid::new_v4(),
            distance_id: Uuid::new_v4(),
            buyer_user_id: buyer,
            registration_group_id: None,
            status: RegistrationStatus::Started,
            expires_at: later(),
            base_price_cents: 1_000,
            discount_amount_cents: 0,
            group_discount_percent_off: None,
            add_ons_cents: 0,
            fees_cents: 50,
            total_cents: 1_050,
            payment_responsibility: PaymentResponsibility::SelfPay,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_ensure_owner() {
        let me = Uuid::new_v4();
        assert!(ensure_owner(Some(registration(Some(me))), me).is_ok());
        assert_eq!(
            ensure_owner(Some(registration(Some(Uuid::new_v4()))), me)
                .unwrap_err()
                .code,
            ErrorCode::Forbidden
        );
        assert_eq!(
            ensure_owner(Some(registration(None)), me).unwrap_err().code,
            ErrorCode::Forbidden
        );
        assert_eq!(ensure_owner(None, me).unwrap_err().code, ErrorCode::NotFound);
    }
}
