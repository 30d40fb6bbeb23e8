use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{config::JwtConfig, state::AppState};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

/// Why a token was rejected. Callers answer all of them with 401.
///
/// There is no `Revoked`: tokens are stateless and stay valid until `exp`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("expected a {expected:?} token")]
    WrongKind { expected: TokenKind },
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        }
    }
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KeyPair {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// Signing material for both token kinds. Access and refresh tokens use
/// different secrets, so one can never verify as the other.
#[derive(Clone)]
pub struct JwtKeys {
    access: KeyPair,
    refresh: KeyPair,
    pub issuer: String,
    pub audience: String,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            access: KeyPair::new(
                &cfg.access_secret,
                Duration::from_secs((cfg.access_ttl_minutes.max(1) as u64) * 60),
            ),
            refresh: KeyPair::new(
                &cfg.refresh_secret,
                Duration::from_secs((cfg.refresh_ttl_days.max(1) as u64) * 24 * 60 * 60),
            ),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

impl JwtKeys {
    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        self.keys(kind).ttl
    }

    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl(kind).as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.keys(kind).encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)?;
        if data.claims.kind != kind {
            return Err(TokenError::WrongKind { expected: kind });
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> JwtConfig {
    JwtConfig {
        access_secret: "access-secret".into(),
        refresh_secret: "refresh-secret".into(),
        issuer: "test-issuer".into(),
        audience: "test-aud".into(),
        access_ttl_minutes: 15,
        refresh_ttl_days: 7,
    }
}
