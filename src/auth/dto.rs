use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::repo_types::User;

/// Request body for user registration. `uid` marks an OAuth-backed signup.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub uid: Option<String>,
    pub phone: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Identity asserted by the OAuth provider, already verified by the caller.
#[derive(Debug, Deserialize)]
pub struct OAuthRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub uid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyResetCodeRequest {
    pub email: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckEmailRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub slug: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub slug: String,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    #[serde(rename = "hasOAuth")]
    pub has_oauth: bool,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            slug: u.slug,
            photo_url: u.photo_url,
            has_oauth: u.has_oauth,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct OAuthResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    #[serde(rename = "hasOAuth")]
    pub has_oauth: bool,
    #[serde(rename = "firstTime")]
    pub first_time: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckEmailResponse {
    pub exists: bool,
    #[serde(rename = "hasOAuth")]
    pub has_oauth: bool,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
