use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        cookies::{clear_auth_cookies, read_access_token, read_refresh_token},
        dto::{
            CheckEmailRequest, CheckEmailResponse, LoginRequest, MessageResponse, OAuthRequest,
            OAuthResponse, PublicUser, RegisterRequest, RegisteredUser, SuccessResponse,
            UserEnvelope, VerifyResetCodeRequest,
        },
        jwt::{JwtKeys, TokenError, TokenKind},
        repo_types::User,
        password::{
            digest_reset_code, hash_password, random_placeholder, verify_password,
            MIN_PASSWORD_LEN,
        },
        services::{
            create_user, is_valid_email, normalize_email, required, start_session,
            user_for_refresh, UserDraft,
        },
    },
    error::{ApiError, StoreError},
    extract::ApiJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/google", post(oauth_upsert))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/refresh", post(refresh))
        .route("/auth/verify-reset-code", post(verify_reset_code))
        .route("/auth/check-email-exists", post(check_email_exists))
}

fn required_email(email: Option<String>) -> Result<String, ApiError> {
    let email = required(email)
        .map(|e| normalize_email(&e))
        .ok_or_else(|| ApiError::validation("Email is required"))?;
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }
    Ok(email)
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<RegisteredUser>), ApiError> {
    let name = required(payload.name).ok_or_else(|| ApiError::validation("Name is required"))?;
    let email = required_email(payload.email)?;
    let uid = required(payload.uid);
    let password = payload.password.filter(|p| !p.is_empty());

    let secret = match (&password, &uid) {
        (Some(p), None) if p.chars().count() < MIN_PASSWORD_LEN => {
            warn!("password too short");
            return Err(ApiError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        (Some(p), _) => p.clone(),
        (None, Some(_)) => random_placeholder(),
        (None, None) => return Err(ApiError::validation("Password is required")),
    };

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let user = create_user(
        state.users.as_ref(),
        UserDraft {
            name,
            email,
            password_hash: hash_password(&secret)?,
            phone: required(payload.phone),
            photo_url: None,
            has_oauth: uid.is_some(),
        },
    )
    .await?;

    let jar = start_session(&state, jar, user.id)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        jar,
        Json(RegisteredUser {
            id: user.id,
            name: user.name,
            email: user.email,
            slug: user.slug,
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<(CookieJar, Json<UserEnvelope>), ApiError> {
    let email = required(payload.email).map(|e| normalize_email(&e));
    let password = payload.password.filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::validation("Email and password are required"));
    };

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(ApiError::not_found("User not found"));
    };

    let ok = match user.password_hash.as_deref() {
        Some(hash) => verify_password(&password, hash)?,
        None => false,
    };
    if !ok {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let jar = start_session(&state, jar, user.id)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok((jar, Json(UserEnvelope { user: user.into() })))
}

#[instrument(skip(state, jar, payload))]
pub async fn oauth_upsert(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<OAuthRequest>,
) -> Result<(CookieJar, Json<OAuthResponse>), ApiError> {
    let email = required_email(payload.email)?;
    let name = required(payload.name).ok_or_else(|| ApiError::validation("Name is required"))?;
    if required(payload.uid).is_none() {
        return Err(ApiError::validation("OAuth uid is required"));
    }
    let photo_url = required(payload.photo_url);

    let existing = state.users.find_by_email(&email).await?;
    let (user, first_time) = match existing {
        Some(user) => (sync_oauth_profile(&state, user, photo_url).await?, false),
        None => {
            let draft = UserDraft {
                name,
                email: email.clone(),
                password_hash: hash_password(&random_placeholder())?,
                phone: None,
                photo_url: photo_url.clone(),
                has_oauth: true,
            };
            match create_user(state.users.as_ref(), draft).await {
                Ok(user) => (user, true),
                // Lost a race with a concurrent first login for the same email.
                Err(StoreError::Duplicate("email")) => {
                    let user = state
                        .users
                        .find_by_email(&email)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("user vanished after duplicate insert"))?;
                    (sync_oauth_profile(&state, user, photo_url).await?, false)
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    let jar = start_session(&state, jar, user.id)?;
    info!(user_id = %user.id, first_time, "oauth sign-in");
    Ok((
        jar,
        Json(OAuthResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            photo_url: user.photo_url,
            has_oauth: user.has_oauth,
            first_time,
        }),
    ))
}

async fn sync_oauth_profile(
    state: &AppState,
    user: User,
    photo_url: Option<String>,
) -> Result<User, ApiError> {
    let photo_changed = photo_url.is_some() && photo_url != user.photo_url;
    if user.has_oauth && !photo_changed {
        return Ok(user);
    }
    let photo = photo_url.or(user.photo_url);
    Ok(state.users.link_oauth(user.id, photo).await?)
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    (
        clear_auth_cookies(jar, state.config.secure_cookies),
        Json(MessageResponse {
            message: "Logged out",
        }),
    )
}

/// An absent or merely expired access token keeps the cookies so the client
/// can still refresh; a token that can never become valid clears both.
#[instrument(skip(state, jar))]
pub async fn me(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<UserEnvelope>, (CookieJar, ApiError)> {
    let secure = state.config.secure_cookies;
    let Some(token) = read_access_token(&jar) else {
        return Err((jar, ApiError::unauthorized("Not authenticated")));
    };

    let claims = match JwtKeys::from_ref(&state).verify(&token, TokenKind::Access) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            return Err((jar, ApiError::unauthorized("Invalid or expired token")));
        }
        Err(e) => {
            warn!(reason = %e, "access token rejected; clearing session");
            return Err((
                clear_auth_cookies(jar, secure),
                ApiError::unauthorized("Invalid or expired token"),
            ));
        }
    };

    let user = match state.users.find_by_id(claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(user_id = %claims.sub, "token for unknown user");
            return Err((
                clear_auth_cookies(jar, secure),
                ApiError::unauthorized("User not found"),
            ));
        }
        Err(e) => return Err((jar, e.into())),
    };
    Ok(Json(UserEnvelope {
        user: PublicUser::from(user),
    }))
}

#[instrument(skip(state, jar))]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), (CookieJar, ApiError)> {
    let secure = state.config.secure_cookies;
    let reject = |jar: CookieJar, msg: &str| {
        (clear_auth_cookies(jar, secure), ApiError::unauthorized(msg))
    };

    let Some(token) = read_refresh_token(&jar) else {
        return Err(reject(jar, "No refresh token"));
    };
    let user = match user_for_refresh(&state, &token).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(reject(jar, "Invalid or expired refresh token")),
        Err(e) => return Err((clear_auth_cookies(jar, secure), e)),
    };

    match start_session(&state, jar.clone(), user.id) {
        Ok(jar) => {
            info!(user_id = %user.id, "session refreshed");
            Ok((jar, Json(MessageResponse { message: "Token refreshed" })))
        }
        Err(e) => Err((clear_auth_cookies(jar, secure), e)),
    }
}

#[instrument(skip(state, payload))]
pub async fn verify_reset_code(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<VerifyResetCodeRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let invalid = || ApiError::validation("Invalid or expired reset code");

    let email = required(payload.email).map(|e| normalize_email(&e));
    let code = required(payload.code);
    let (Some(email), Some(code)) = (email, code) else {
        return Err(ApiError::validation("Email and code are required"));
    };

    let user = state.users.find_by_email(&email).await?.ok_or_else(invalid)?;
    let (Some(stored), Some(expires)) = (user.reset_code_hash, user.reset_code_expires) else {
        warn!(user_id = %user.id, "no reset code on file");
        return Err(invalid());
    };
    if digest_reset_code(&code) != stored {
        warn!(user_id = %user.id, "reset code mismatch");
        return Err(invalid());
    }
    if OffsetDateTime::now_utc() > expires {
        warn!(user_id = %user.id, "reset code expired");
        return Err(invalid());
    }

    Ok(Json(SuccessResponse { success: true }))
}

#[instrument(skip(state, payload))]
pub async fn check_email_exists(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CheckEmailRequest>,
) -> Result<Json<CheckEmailResponse>, ApiError> {
    let email = required(payload.email)
        .map(|e| normalize_email(&e))
        .ok_or_else(|| ApiError::validation("Email is required"))?;
    let user = state.users.find_by_email(&email).await?;
    Ok(Json(CheckEmailResponse {
        exists: user.is_some(),
        has_oauth: user.map(|u| u.has_oauth).unwrap_or(false),
    }))
}
