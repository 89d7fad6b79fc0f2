use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::{config::JwtConfig, state::AppState};

/// Clock skew tolerated when checking `exp`, in seconds.
const LEEWAY_SECS: u64 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token malformed or signature invalid")]
    Invalid,
}

/// Signing and verification keys, built once from configuration.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.auth.keys().clone()
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64).saturating_mul(60)),
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| now.checked_add(TimeDuration::seconds(secs)))
            .ok_or_else(|| anyhow::anyhow!("token lifetime out of range: {}s", ttl.as_secs()))?;
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, ttl_secs = ttl.as_secs(), "jwt signed");
        Ok(token)
    }

    /// Issue a token with the configured lifetime.
    pub fn sign(&self, user_id: Uuid, email: &str) -> anyhow::Result<String> {
        self.issue(user_id, email, self.ttl)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = LEEWAY_SECS;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}
