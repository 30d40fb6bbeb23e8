use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub email: String,                         // trimmed, lower-cased
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,         // Argon2 PHC string
    pub phone: Option<String>,
    pub photo_url: Option<String>,
    pub has_oauth: bool,
    #[serde(skip_serializing)]
    pub reset_code_hash: Option<String>,       // SHA-256 hex
    #[serde(skip_serializing)]
    pub reset_code_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields needed to insert a user; the hash is computed before this is built.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub slug: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub photo_url: Option<String>,
    pub has_oauth: bool,
}
