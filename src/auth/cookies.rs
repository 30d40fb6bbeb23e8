use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::OffsetDateTime;

pub const ACCESS_COOKIE: &str = "vf_access";
pub const REFRESH_COOKIE: &str = "vf_refresh";

fn auth_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    // No Domain attribute: host-only. Lax survives the OAuth redirect back to us.
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age.as_secs() as i64))
        .build()
}

fn expired_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

/// Lifetimes of the two cookies, mirroring the token lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct CookieTtls {
    pub access: Duration,
    pub refresh: Duration,
}

pub fn set_auth_cookies(
    jar: CookieJar,
    access: String,
    refresh: String,
    ttls: CookieTtls,
    secure: bool,
) -> CookieJar {
    jar.add(auth_cookie(ACCESS_COOKIE, access, ttls.access, secure))
        .add(auth_cookie(REFRESH_COOKIE, refresh, ttls.refresh, secure))
}

pub fn clear_auth_cookies(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(expired_cookie(ACCESS_COOKIE, secure))
        .add(expired_cookie(REFRESH_COOKIE, secure))
}

pub fn read_access_token(jar: &CookieJar) -> Option<String> {
    read(jar, ACCESS_COOKIE)
}

pub fn read_refresh_token(jar: &CookieJar) -> Option<String> {
    read(jar, REFRESH_COOKIE)
}

fn read(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
