use anyhow::Context;
use axum::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WishlistEntry {
    pub product_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
}

#[async_trait]
pub trait WishlistRepo: Send + Sync {
    /// Entries of the user's wishlist, oldest first; empty when none exists.
    async fn entries(&self, user_id: Uuid) -> anyhow::Result<Vec<WishlistEntry>>;
    /// Which of `product_ids` are on the user's wishlist, in no particular order.
    async fn wishlisted_among(&self, user_id: Uuid, product_ids: &[Uuid]) -> anyhow::Result<Vec<Uuid>>;
    /// Adds the product if absent, removes it if present. Returns whether it is now wishlisted.
    async fn toggle(&self, user_id: Uuid, product_id: Uuid) -> anyhow::Result<bool>;
}

/// A concurrent toggle may have inserted the row already; that still counts as wishlisted.
const ADD_ITEM: &str = "INSERT INTO wishlist_items (wishlist_id, product_id) VALUES ($1, $2) \
     ON CONFLICT (wishlist_id, product_id) DO NOTHING";

#[derive(Clone)]
pub struct PgWishlistRepo {
    db: PgPool,
}

impl PgWishlistRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WishlistRepo for PgWishlistRepo {
    async fn entries(&self, user_id: Uuid) -> anyhow::Result<Vec<WishlistEntry>> {
        let rows = sqlx::query_as::<_, WishlistEntry>(
            r#"
            SELECT i.product_id, i.added_at
              FROM wishlist_items i
              JOIN wishlists w ON w.id = i.wishlist_id
             WHERE w.user_id = $1
             ORDER BY i.added_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list wishlist entries")?;
        Ok(rows)
    }

    async fn wishlisted_among(&self, user_id: Uuid, product_ids: &[Uuid]) -> anyhow::Result<Vec<Uuid>> {
        let rows: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT i.product_id
              FROM wishlist_items i
              JOIN wishlists w ON w.id = i.wishlist_id
             WHERE w.user_id = $1 AND i.product_id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(product_ids)
        .fetch_all(&self.db)
        .await
        .context("check wishlist membership")?;
        Ok(rows)
    }

    async fn toggle(&self, user_id: Uuid, product_id: Uuid) -> anyhow::Result<bool> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let wishlist_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO wishlists (user_id) VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING id
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .context("ensure wishlist")?;

        let removed = sqlx::query("DELETE FROM wishlist_items WHERE wishlist_id = $1 AND product_id = $2")
            .bind(wishlist_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await
            .context("remove wishlist item")?
            .rows_affected()
            > 0;

        if !removed {
            sqlx::query(ADD_ITEM)
                .bind(wishlist_id)
                .bind(product_id)
                .execute(&mut *tx)
                .await
                .context("add wishlist item")?;
        }

        tx.commit().await.context("commit tx")?;
        Ok(!removed)
    }
}
