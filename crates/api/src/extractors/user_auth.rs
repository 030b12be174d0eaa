//! Authenticated caller extractor.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::user_auth::{bearer_token, SessionAuth};
use crate::middleware::RequestId;
use crate::services::CommandContext;

/// The verified caller of a request, ready to hand to a service.
///
/// Uses the [`SessionAuth`] stored by `require_user_auth` when present and
/// validates the Bearer token itself otherwise.
#[derive(Debug, Clone)]
pub struct UserAuth(pub CommandContext);

impl UserAuth {
    pub fn ctx(&self) -> &CommandContext {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for UserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = match parts.extensions.get::<SessionAuth>() {
            Some(session) => session.clone(),
            None => {
                let header = parts
                    .headers
                    .get(axum::http::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok());
                let token = bearer_token(header).ok_or_else(|| {
                    ApiError::Unauthorized("Missing or invalid Authorization header".to_string())
                })?;
                SessionAuth::validate(&state.jwt, token)?
            }
        };

        let request_id = parts.extensions.get::<RequestId>().map(|r| r.0.clone());
        Ok(UserAuth(
            CommandContext::new(session.auth).with_request_id(request_id),
        ))
    }
}
