use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, ErrorCode};
use persistence::db::UNIQUE_VIOLATION;
use serde::Serialize;
use thiserror::Error;

use crate::services::ServiceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A rejected business command, rendered with its own code.
    #[error("{0}")]
    Domain(DomainError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<ValidationDetail>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

/// HTTP status for a domain error code.
pub fn status_for_code(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound | ErrorCode::PromotionUnavailable => StatusCode::NOT_FOUND,
        ErrorCode::RegistrationExpired => StatusCode::GONE,
        ErrorCode::InvalidState
        | ErrorCode::InsufficientCapacity
        | ErrorCode::AlreadyClaimed
        | ErrorCode::PromotionCapReached
        | ErrorCode::NoActiveSubscription => StatusCode::CONFLICT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, ErrorCode::Forbidden.as_str(), msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NotFound.as_str(), msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorCode::ValidationError.as_str(),
                msg,
            ),
            ApiError::Domain(err) => (status_for_code(err.code), err.code.as_str(), err.message),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".into(),
                )
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Domain(err) => ApiError::Domain(err),
            ServiceError::LostRace(what) => {
                ApiError::Internal(format!("Concurrent update lost: {}", what))
            }
            ServiceError::Database(err) => err.into(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".into()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(code) if code == UNIQUE_VIOLATION => {
                    ApiError::Conflict("Resource already exists".into())
                }
                Some("23503") => ApiError::NotFound("Referenced resource not found".into()),
                _ => ApiError::Internal(format!("Database error: {}", db_err)),
            },
            sqlx::Error::PoolTimedOut => {
                ApiError::ServiceUnavailable("Database is not accepting connections".into())
            }
            _ => ApiError::Internal(format!("Database error: {}", err)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| ValidationDetail {
                    field: field.to_string(),
                    message: e.message.clone().map(|m| m.to_string()).unwrap_or_default(),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        let message = if details.len() == 1 {
            details[0].message.clone()
        } else {
            format!("{} validation errors", details.len())
        };

        ApiError::Validation(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_domain_code_statuses() {
        assert_eq!(
            status_for_code(ErrorCode::ValidationError),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for_code(ErrorCode::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_for_code(ErrorCode::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for_code(ErrorCode::RegistrationExpired),
            StatusCode::GONE
        );
        assert_eq!(
            status_for_code(ErrorCode::InsufficientCapacity),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for_code(ErrorCode::PromotionCapReached),
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn test_domain_error_body_carries_code() {
        let response =
            ApiError::from(DomainError::insufficient_capacity("10K is full")).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"], "INSUFFICIENT_CAPACITY");
        assert_eq!(body["message"], "10K is full");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_internal_error_hides_message() {
        let response = ApiError::Internal("connection reset by peer".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "An internal error occurred");
    }

    #[test]
    fn test_lost_race_is_internal() {
        let error: ApiError = ServiceError::LostRace("registration transition".into()).into();
        assert!(matches!(error, ApiError::Internal(_)));
    }

    #[test]
    fn test_service_domain_error_passes_through() {
        let error: ApiError =
            ServiceError::Domain(DomainError::expired("registration hold has expired")).into();
        match error {
            ApiError::Domain(err) => assert_eq!(err.code, ErrorCode::RegistrationExpired),
            other => panic!("Expected Domain error, got {:?}", other),
        }
    }

    #[test]
    fn test_api_error_statuses() {
        assert_eq!(
            ApiError::Unauthorized("x".into()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Validation("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::ServiceUnavailable("x".into())
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_from_sqlx_row_not_found() {
        let error: ApiError = sqlx::Error::RowNotFound.into();
        match error {
            ApiError::NotFound(msg) => assert_eq!(msg, "Resource not found"),
            _ => panic!("Expected NotFound error"),
        }
    }

    #[test]
    fn test_from_validation_errors() {
        use validator::Validate;

        let input = domain::models::RegistrantInput {
            first_name: String::new(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            date_of_birth: None,
            phone: None,
        };
        let error: ApiError = input.validate().unwrap_err().into();
        match error {
            ApiError::Validation(msg) => assert_eq!(msg, "firstName must be 1-100 characters"),
            _ => panic!("Expected Validation error"),
        }
    }
}
