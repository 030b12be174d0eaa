//! Hold TTL policy.
//!
//! A registration in a hold status reserves a slot only until its
//! `expires_at`. Expiry is never materialized in storage: every reader
//! re-evaluates [`is_expired_hold`] against its own `now`.

use chrono::{DateTime, Duration, Utc};

use crate::models::RegistrationStatus;

pub const DEFAULT_STARTED_TTL_MINUTES: f64 = 30.0;
pub const DEFAULT_SUBMITTED_TTL_MINUTES: f64 = 30.0;
pub const DEFAULT_PAYMENT_PENDING_TTL_HOURS: f64 = 24.0;

/// Upper bound for any configured TTL (366 days). Larger values fall back to
/// the defaults like non-positive ones.
const MAX_TTL_MINUTES: f64 = 60.0 * 24.0 * 366.0;

/// Resolved TTLs for each hold status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldPolicy {
    started_ttl_minutes: f64,
    submitted_ttl_minutes: f64,
    payment_pending_ttl_hours: f64,
}

impl Default for HoldPolicy {
    fn default() -> Self {
        Self {
            started_ttl_minutes: DEFAULT_STARTED_TTL_MINUTES,
            submitted_ttl_minutes: DEFAULT_SUBMITTED_TTL_MINUTES,
            payment_pending_ttl_hours: DEFAULT_PAYMENT_PENDING_TTL_HOURS,
        }
    }
}

impl HoldPolicy {
    /// Builds a policy from configured values, falling back per value when
    /// one is non-finite, non-positive or absurdly large.
    pub fn new(
        started_ttl_minutes: f64,
        submitted_ttl_minutes: f64,
        payment_pending_ttl_hours: f64,
    ) -> Self {
        Self {
            started_ttl_minutes: sanitize(started_ttl_minutes, DEFAULT_STARTED_TTL_MINUTES, 1.0),
            submitted_ttl_minutes: sanitize(
                submitted_ttl_minutes,
                DEFAULT_SUBMITTED_TTL_MINUTES,
                1.0,
            ),
            payment_pending_ttl_hours: sanitize(
                payment_pending_ttl_hours,
                DEFAULT_PAYMENT_PENDING_TTL_HOURS,
                60.0,
            ),
        }
    }

    pub fn started_ttl_minutes(&self) -> f64 {
        self.started_ttl_minutes
    }

    pub fn submitted_ttl_minutes(&self) -> f64 {
        self.submitted_ttl_minutes
    }

    pub fn payment_pending_ttl_hours(&self) -> f64 {
        self.payment_pending_ttl_hours
    }

    /// TTL for a status; `None` for statuses that carry no expiry.
    pub fn ttl_for(&self, status: RegistrationStatus) -> Option<Duration> {
        let minutes = match status {
            RegistrationStatus::Started => self.started_ttl_minutes,
            RegistrationStatus::Submitted => self.submitted_ttl_minutes,
            RegistrationStatus::PaymentPending => self.payment_pending_ttl_hours * 60.0,
            RegistrationStatus::Confirmed | RegistrationStatus::Cancelled => return None,
        };
        Some(Duration::milliseconds((minutes * 60_000.0).round() as i64))
    }

    /// Expiry timestamp a registration entering `status` at `now` should carry.
    pub fn compute_expires_at(
        &self,
        now: DateTime<Utc>,
        status: RegistrationStatus,
    ) -> Option<DateTime<Utc>> {
        self.ttl_for(status).map(|ttl| now + ttl)
    }
}

fn sanitize(value: f64, fallback: f64, minutes_per_unit: f64) -> f64 {
    if value.is_finite() && value > 0.0 && value * minutes_per_unit <= MAX_TTL_MINUTES {
        value
    } else {
        fallback
    }
}

/// Whether a registration no longer holds its slot at `now`.
///
/// Cancelled is always expired and confirmed never is. Hold statuses are
/// expired when `expires_at` is missing or not strictly in the future.
pub fn is_expired_hold(
    status: RegistrationStatus,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match status {
        RegistrationStatus::Cancelled => true,
        RegistrationStatus::Confirmed => false,
        RegistrationStatus::Started
        | RegistrationStatus::Submitted
        | RegistrationStatus::PaymentPending => expires_at.map_or(true, |t| t <= now),
    }
}

/// Same as [`is_expired_hold`] for a raw stored status. Unknown statuses are expired.
pub fn is_expired_hold_raw(
    status: &str,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match status.parse::<RegistrationStatus>() {
        Ok(status) => is_expired_hold(status, expires_at, now),
        Err(_) => true,
    }
}

/// Whether a registration counts toward capacity at `now`.
pub fn is_reserved(
    status: RegistrationStatus,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    !is_expired_hold(status, expires_at, now)
}
