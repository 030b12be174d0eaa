//! Registration domain models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Lifecycle status of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Started,
    Submitted,
    PaymentPending,
    Confirmed,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Submitted => "submitted",
            Self::PaymentPending => "payment_pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses that hold a slot only while their TTL has not lapsed.
    pub fn is_hold(&self) -> bool {
        matches!(
            self,
            Self::Started | Self::Submitted | Self::PaymentPending
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled)
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "submitted" => Ok(Self::Submitted),
            "payment_pending" => Ok(Self::PaymentPending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown registration status: {}", s)),
        }
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who pays for a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentResponsibility {
    /// The claiming participant pays.
    #[default]
    SelfPay,
    /// The group organizer pays centrally.
    CentralPay,
}

impl PaymentResponsibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfPay => "self_pay",
            Self::CentralPay => "central_pay",
        }
    }
}

impl FromStr for PaymentResponsibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self_pay" => Ok(Self::SelfPay),
            "central_pay" => Ok(Self::CentralPay),
            _ => Err(format!("Unknown payment responsibility: {}", s)),
        }
    }
}

/// A person's claim on one distance of an event edition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub distance_id: Uuid,
    pub buyer_user_id: Option<Uuid>,
    pub registration_group_id: Option<Uuid>,
    pub status: RegistrationStatus,
    pub expires_at: Option<DateTime<Utc>>,
    /// Base price after any group discount.
    pub base_price_cents: i64,
    pub discount_amount_cents: i64,
    pub group_discount_percent_off: Option<i32>,
    pub add_ons_cents: i64,
    pub fees_cents: i64,
    pub total_cents: i64,
    pub payment_responsibility: PaymentResponsibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    /// Base price before any group discount was applied.
    pub fn list_price_cents(&self) -> i64 {
        self.base_price_cents + self.discount_amount_cents
    }
}

/// Participant details attached to a registration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegistrantInput {
    #[validate(length(min = 1, max = 100, message = "firstName must be 1-100 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100, message = "lastName must be 1-100 characters"))]
    pub last_name: String,

    #[validate(email(message = "email must be a valid email address"))]
    pub email: String,

    pub date_of_birth: Option<NaiveDate>,

    #[validate(length(max = 40, message = "phone must be at most 40 characters"))]
    pub phone: Option<String>,
}

/// Request to start a registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRegistrationRequest {
    pub edition_id: Uuid,
    pub distance_id: Uuid,
    pub registration_group_id: Option<Uuid>,
}

/// Result of a completed demo payment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoPaymentResult {
    pub registration_id: Uuid,
    pub status: RegistrationStatus,
    /// True when the registration was already confirmed before this call.
    pub already_confirmed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            RegistrationStatus::Started,
            RegistrationStatus::Submitted,
            RegistrationStatus::PaymentPending,
            RegistrationStatus::Confirmed,
            RegistrationStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<RegistrationStatus>().unwrap(), status);
        }
        assert!("expired".parse::<RegistrationStatus>().is_err());
    }

    #[test]
    fn test_status_classification() {
        assert!(RegistrationStatus::Started.is_hold());
        assert!(RegistrationStatus::PaymentPending.is_hold());
        assert!(!RegistrationStatus::Confirmed.is_hold());
        assert!(RegistrationStatus::Confirmed.is_terminal());
        assert!(RegistrationStatus::Cancelled.is_terminal());
        assert!(!RegistrationStatus::Submitted.is_terminal());
    }

    #[test]
    fn test_payment_responsibility_parse() {
        assert_eq!(
            "central_pay".parse::<PaymentResponsibility>().unwrap(),
            PaymentResponsibility::CentralPay
        );
        assert_eq!(PaymentResponsibility::default(), PaymentResponsibility::SelfPay);
        assert!("cash".parse::<PaymentResponsibility>().is_err());
    }

    #[test]
    fn test_registrant_input_validation() {
        let valid = RegistrantInput {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            date_of_birth: None,
            phone: None,
        };
        assert!(valid.validate().is_ok());

        let invalid = RegistrantInput {
            email: "nope".into(),
            first_name: String::new(),
            ..valid
        };
        let errors = invalid.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
        assert!(errors.field_errors().contains_key("first_name"));
    }
}
