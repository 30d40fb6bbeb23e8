use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};
use crate::error::StoreError;

/// Credential store.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn slug_exists(&self, slug: &str) -> anyhow::Result<bool>;
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
    /// Marks the account as OAuth-linked and replaces its photo.
    async fn link_oauth(&self, id: Uuid, photo_url: Option<String>) -> anyhow::Result<User>;
}

const USER_COLUMNS: &str = "id, name, slug, email, password_hash, phone, photo_url, has_oauth, \
     reset_code_hash, reset_code_expires, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn slug_exists(&self, slug: &str) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE slug = $1)")
            .bind(slug)
            .fetch_one(&self.db)
            .await
            .context("check user slug")?;
        Ok(exists)
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, slug, email, password_hash, phone, photo_url, has_oauth)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.name)
        .bind(&user.slug)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(&user.photo_url)
        .bind(user.has_oauth)
        .fetch_one(&self.db)
        .await
        .map_err(|e| StoreError::from_sqlx(e, &["email", "slug", "phone"]))?;
        Ok(created)
    }

    async fn link_oauth(&self, id: Uuid, photo_url: Option<String>) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET has_oauth = TRUE, photo_url = $2, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(photo_url)
        .fetch_one(&self.db)
        .await
        .context("link oauth account")?;
        Ok(user)
    }
}
