use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::reviews::repo_types::{NewReview, Review};

#[async_trait]
pub trait ReviewRepo: Send + Sync {
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Review>>;
    /// One review per (user, product); a second one is `Duplicate("user_id")`.
    async fn create(&self, review: NewReview) -> Result<Review, StoreError>;
    async fn list_published(&self, product_id: Uuid) -> anyhow::Result<Vec<Review>>;
    /// Bumps `reported_count` once per reporter and flags the review once it
    /// reaches `flag_threshold`. `None` means this reporter already reported it.
    async fn record_report(
        &self,
        id: Uuid,
        reporter_id: Uuid,
        flag_threshold: i32,
    ) -> anyhow::Result<Option<Review>>;
    async fn record_helpful(&self, id: Uuid) -> anyhow::Result<Review>;
}

const REVIEW_COLUMNS: &str = "id, product_id, user_id, rating, title, comment, status, \
     reported_count, helpful_count, created_at, updated_at";

#[derive(Clone)]
pub struct PgReviewRepo {
    db: PgPool,
}

impl PgReviewRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReviewRepo for PgReviewRepo {
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Review>> {
        let row = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find review")?;
        Ok(row)
    }

    async fn create(&self, review: NewReview) -> Result<Review, StoreError> {
        let row = sqlx::query_as::<_, Review>(&format!(
            r#"
            INSERT INTO reviews (product_id, user_id, rating, title, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(review.product_id)
        .bind(review.user_id)
        .bind(review.rating)
        .bind(&review.title)
        .bind(&review.comment)
        .fetch_one(&self.db)
        .await
        .map_err(|e| StoreError::from_sqlx(e, &["user_id"]))?;
        Ok(row)
    }

    async fn list_published(&self, product_id: Uuid) -> anyhow::Result<Vec<Review>> {
        let rows = sqlx::query_as::<_, Review>(&format!(
            r#"
            SELECT {REVIEW_COLUMNS}
              FROM reviews
             WHERE product_id = $1 AND status = 'published'
             ORDER BY created_at DESC
            "#
        ))
        .bind(product_id)
        .fetch_all(&self.db)
        .await
        .context("list reviews")?;
        Ok(rows)
    }

    async fn record_report(
        &self,
        id: Uuid,
        reporter_id: Uuid,
        flag_threshold: i32,
    ) -> anyhow::Result<Option<Review>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let inserted = sqlx::query(
            "INSERT INTO review_reports (review_id, user_id) VALUES ($1, $2) \
             ON CONFLICT (review_id, user_id) DO NOTHING",
        )
        .bind(id)
        .bind(reporter_id)
        .execute(&mut *tx)
        .await
        .context("record reporter")?
        .rows_affected();
        if inserted == 0 {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, Review>(&format!(
            r#"
            UPDATE reviews
               SET reported_count = reported_count + 1,
                   status = CASE WHEN reported_count + 1 >= $2
                                 THEN 'flagged'::review_status
                                 ELSE status END,
                   updated_at = now()
             WHERE id = $1
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(flag_threshold)
        .fetch_one(&mut *tx)
        .await
        .context("report review")?;

        tx.commit().await.context("commit tx")?;
        Ok(Some(row))
    }

    async fn record_helpful(&self, id: Uuid) -> anyhow::Result<Review> {
        let row = sqlx::query_as::<_, Review>(&format!(
            r#"
            UPDATE reviews
               SET helpful_count = helpful_count + 1, updated_at = now()
             WHERE id = $1
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&self.db)
        .await
        .context("mark review helpful")?;
        Ok(row)
    }
}
