use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;
use uuid::Uuid;

use super::{
    cookies::read_access_token,
    jwt::{JwtKeys, TokenKind},
};
use crate::error::ApiError;

/// Caller identity taken from the access-token cookie.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = read_access_token(&jar)
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(&token, TokenKind::Access).map_err(|e| {
            warn!(reason = %e, "access token rejected");
            ApiError::unauthorized("Invalid or expired token")
        })?;

        Ok(AuthUser(claims.sub))
    }
}
