//! Bearer-token extractor guarding the operator console.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use secrecy::ExposeSecret;

use super::{AdminError, AdminState};

/// Proof that the request carried the configured console token. Add it as a
/// handler parameter to require authentication.
#[derive(Debug, Clone, Copy)]
pub struct Operator;

impl FromRequestParts<AdminState> for Operator {
    type Rejection = AdminError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AdminState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AdminError::Unauthorized("Missing Authorization header".into()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AdminError::Unauthorized("Expected: Authorization: Bearer <token>".into())
        })?;

        if token != state.token.expose_secret() {
            tracing::warn!(path = %parts.uri.path(), "Console request with wrong token");
            return Err(AdminError::Unauthorized("Invalid token".into()));
        }
        Ok(Operator)
    }
}
