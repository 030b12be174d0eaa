//! Session token authentication middleware.
//!
//! Validates the Bearer token on every protected route and stores the
//! resulting [`SessionAuth`] in request extensions for the extractors.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use domain::models::AuthContext;
use shared::jwt::{extract_user_id, JwtConfig};

use crate::app::AppState;
use crate::error::ApiError;

/// Caller context decoded from a valid session token.
#[derive(Debug, Clone)]
pub struct SessionAuth {
    pub auth: AuthContext,
    /// Token id, logged for session correlation.
    pub jti: String,
}

impl SessionAuth {
    pub fn validate(jwt: &JwtConfig, token: &str) -> Result<Self, ApiError> {
        let claims = jwt.validate_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Session token rejected");
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;
        let user_id = extract_user_id(&claims)
            .map_err(|_| ApiError::Unauthorized("Invalid user ID in token".to_string()))?;

        let permissions: Vec<&str> = claims.permissions.iter().map(String::as_str).collect();
        let mut auth = AuthContext::new(user_id).with_permissions(&permissions);
        if claims.is_internal {
            auth = auth.internal();
        }

        Ok(Self {
            auth,
            jti: claims.jti,
        })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Rejects requests without a valid session token.
pub async fn require_user_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(token) = bearer_token(header) else {
        return ApiError::Unauthorized("Missing or invalid Authorization header".to_string())
            .into_response();
    };

    match SessionAuth::validate(&state.jwt, token) {
        Ok(session) => {
            tracing::Span::current().record("user_id", tracing::field::display(session.auth.user_id));
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn jwt() -> JwtConfig {
        JwtConfig::from_secret("middleware-test-secret-0123456789", 600, 0).unwrap()
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn test_validate_carries_claims_into_context() {
        let jwt = jwt();
        let user_id = Uuid::new_v4();
        let token = jwt
            .issue_token(user_id, false, &["registrations:manage"])
            .unwrap();

        let session = SessionAuth::validate(&jwt, &token).unwrap();
        assert_eq!(session.auth.user_id, user_id);
        assert!(!session.auth.is_internal);
        assert!(session.auth.has_permission("registrations:manage"));
        assert!(!session.auth.has_permission("billing:admin"));
    }

    #[test]
    fn test_validate_rejects_garbage() {
        assert!(matches!(
            SessionAuth::validate(&jwt(), "not-a-token"),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
