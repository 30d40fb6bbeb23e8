use axum::extract::FromRef;
use axum_extra::extract::cookie::CookieJar;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::{
        cookies::{set_auth_cookies, CookieTtls},
        jwt::{JwtKeys, TokenKind},
        repo::UserRepo,
        repo_types::{NewUser, User},
    },
    error::{ApiError, StoreError},
    slug::{candidate, slugify},
    state::AppState,
};

const MAX_SLUG_CANDIDATES: u32 = 1000;
const MAX_CREATE_ATTEMPTS: u32 = 3;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trimmed, non-empty value of an optional input field.
pub(crate) fn required(field: Option<String>) -> Option<String> {
    field
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Everything about a new account except its slug.
pub struct UserDraft {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub photo_url: Option<String>,
    pub has_oauth: bool,
}

async fn next_free_slug(users: &dyn UserRepo, base: &str) -> anyhow::Result<String> {
    for n in 0..MAX_SLUG_CANDIDATES {
        let slug = candidate(base, n);
        if !users.slug_exists(&slug).await? {
            return Ok(slug);
        }
    }
    anyhow::bail!("no free slug for {base}")
}

/// Inserts a user under a fresh slug. A slug taken between the lookup and
/// the insert is retried with the next candidate.
pub async fn create_user(users: &dyn UserRepo, draft: UserDraft) -> Result<User, StoreError> {
    let base = slugify(&draft.name);
    for attempt in 1..=MAX_CREATE_ATTEMPTS {
        let slug = next_free_slug(users, &base).await?;
        let new_user = NewUser {
            name: draft.name.clone(),
            slug,
            email: draft.email.clone(),
            password_hash: draft.password_hash.clone(),
            phone: draft.phone.clone(),
            photo_url: draft.photo_url.clone(),
            has_oauth: draft.has_oauth,
        };
        match users.create(new_user).await {
            Err(StoreError::Duplicate("slug")) => {
                debug!(attempt, base = %base, "slug taken concurrently");
                continue;
            }
            other => return other,
        }
    }
    Err(StoreError::Duplicate("slug"))
}

/// Signs a fresh token pair for `user_id` and writes both cookies.
pub fn start_session(state: &AppState, jar: CookieJar, user_id: Uuid) -> Result<CookieJar, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let access = keys.sign_access(user_id)?;
    let refresh = keys.sign_refresh(user_id)?;
    let ttls = CookieTtls {
        access: keys.ttl(TokenKind::Access),
        refresh: keys.ttl(TokenKind::Refresh),
    };
    Ok(set_auth_cookies(jar, access, refresh, ttls, state.config.secure_cookies))
}

/// Resolves the user behind a refresh token, or says why it can't.
pub async fn user_for_refresh(state: &AppState, token: &str) -> Result<Option<User>, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let claims = match keys.verify(token, TokenKind::Refresh) {
        Ok(c) => c,
        Err(e) => {
            warn!(reason = %e, "refresh token rejected");
            return Ok(None);
        }
    };
    Ok(state.users.find_by_id(claims.sub).await?)
}
