use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;
use uuid::Uuid;

use super::jwt::{JwtKeys, TokenError};
use crate::error::AppError;

/// Extracts and validates the bearer JWT, returning the user ID.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized("Missing Authorization header"))?;

        let token = bearer_token(header)
            .ok_or(AppError::Unauthorized("Invalid Authorization header"))?;

        let keys = JwtKeys::from_ref(state);
        match keys.verify(token) {
            Ok(claims) => Ok(AuthUser(claims.sub)),
            Err(TokenError::Expired) => {
                warn!("expired token");
                Err(AppError::Unauthorized("Invalid or expired token"))
            }
            Err(TokenError::Invalid) => {
                warn!("invalid token");
                Err(AppError::Unauthorized("Invalid or expired token"))
            }
        }
    }
}

// Expect "Bearer <token>", scheme case-insensitive.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
