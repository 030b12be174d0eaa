//! Typed business outcomes.
//!
//! Expected rule violations are values, not panics: commands return
//! `Err(DomainError)` and callers branch on [`ErrorCode`].

use serde::Serialize;
use thiserror::Error;

/// Machine-readable code for a rejected command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    InvalidState,
    InsufficientCapacity,
    NotFound,
    Forbidden,
    RegistrationExpired,
    AlreadyClaimed,
    PromotionUnavailable,
    PromotionCapReached,
    NoActiveSubscription,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::InsufficientCapacity => "INSUFFICIENT_CAPACITY",
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::RegistrationExpired => "REGISTRATION_EXPIRED",
            Self::AlreadyClaimed => "ALREADY_CLAIMED",
            Self::PromotionUnavailable => "PROMOTION_UNAVAILABLE",
            Self::PromotionCapReached => "PROMOTION_CAP_REACHED",
            Self::NoActiveSubscription => "NO_ACTIVE_SUBSCRIPTION",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected business command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
}

impl DomainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, message)
    }

    pub fn insufficient_capacity(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientCapacity, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn expired(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RegistrationExpired, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(ErrorCode::ValidationError.as_str(), "VALIDATION_ERROR");
        assert_eq!(
            ErrorCode::InsufficientCapacity.to_string(),
            "INSUFFICIENT_CAPACITY"
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::RegistrationExpired).unwrap(),
            "\"REGISTRATION_EXPIRED\""
        );
    }

    #[test]
    fn test_domain_error_display() {
        let err = DomainError::invalid_state("batch already processed");
        assert_eq!(err.code, ErrorCode::InvalidState);
        assert_eq!(err.to_string(), "INVALID_STATE: batch already processed");
    }
}
