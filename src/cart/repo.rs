use anyhow::Context;
use axum::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[async_trait]
pub trait CartRepo: Send + Sync {
    /// Lines of the user's cart, oldest first.
    async fn lines(&self, user_id: Uuid) -> anyhow::Result<Vec<CartLine>>;
    /// Adds `quantity` to the product's line, creating it when absent.
    async fn add(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> anyhow::Result<()>;
    async fn remove(&self, user_id: Uuid, product_id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgCartRepo {
    db: PgPool,
}

impl PgCartRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CartRepo for PgCartRepo {
    async fn lines(&self, user_id: Uuid) -> anyhow::Result<Vec<CartLine>> {
        let rows = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT product_id, quantity
              FROM cart_items
             WHERE user_id = $1
             ORDER BY added_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list cart lines")?;
        Ok(rows)
    }

    async fn add(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id)
            DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .execute(&self.db)
        .await
        .context("add cart line")?;
        Ok(())
    }

    async fn remove(&self, user_id: Uuid, product_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.db)
            .await
            .context("remove cart line")?;
        Ok(res.rows_affected() > 0)
    }
}
