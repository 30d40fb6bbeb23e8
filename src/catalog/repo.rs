use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::catalog::repo_types::{Category, Inspiration, Page, Product, ProductPatch, SubCategory};

#[async_trait]
pub trait CatalogRepo: Send + Sync {
    async fn list_categories(&self) -> anyhow::Result<Vec<Category>>;
    async fn categories_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Category>>;
    async fn list_subcategories(&self, category_id: Option<Uuid>) -> anyhow::Result<Vec<SubCategory>>;
    async fn list_inspirations(&self, page: Page) -> anyhow::Result<Vec<Inspiration>>;
    async fn count_inspirations(&self) -> anyhow::Result<i64>;
    async fn find_inspiration_by_slug(&self, slug: &str) -> anyhow::Result<Option<Inspiration>>;
    async fn list_products(&self, category_slug: Option<&str>, page: Page) -> anyhow::Result<Vec<Product>>;
    async fn count_products(&self, category_slug: Option<&str>) -> anyhow::Result<i64>;
    async fn find_product(&self, id: Uuid) -> anyhow::Result<Option<Product>>;
    async fn products_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Product>>;
    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> anyhow::Result<Option<Product>>;
}

const CATEGORY_COLUMNS: &str = "id, name, slug, description, image, created_at, updated_at";
const SUBCATEGORY_COLUMNS: &str =
    "id, category_id, name, slug, description, image, created_at, updated_at";
const PRODUCT_COLUMNS: &str = "id, category_id, subcategory_id, name, slug, description, price, \
     stock, images, created_at, updated_at";
const INSPIRATION_COLUMNS: &str =
    "id, title, slug, description, image, category_ids, created_at, updated_at";

#[derive(Clone)]
pub struct PgCatalogRepo {
    db: PgPool,
}

impl PgCatalogRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogRepo for PgCatalogRepo {
    async fn list_categories(&self) -> anyhow::Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name ASC"
        ))
        .fetch_all(&self.db)
        .await
        .context("list categories")?;
        Ok(rows)
    }

    async fn categories_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ANY($1) ORDER BY name ASC"
        ))
        .bind(ids)
        .fetch_all(&self.db)
        .await
        .context("categories by ids")?;
        Ok(rows)
    }

    async fn list_subcategories(&self, category_id: Option<Uuid>) -> anyhow::Result<Vec<SubCategory>> {
        let rows = sqlx::query_as::<_, SubCategory>(&format!(
            r#"
            SELECT {SUBCATEGORY_COLUMNS}
              FROM subcategories
             WHERE ($1::uuid IS NULL OR category_id = $1)
             ORDER BY name ASC
            "#
        ))
        .bind(category_id)
        .fetch_all(&self.db)
        .await
        .context("list subcategories")?;
        Ok(rows)
    }

    async fn list_inspirations(&self, page: Page) -> anyhow::Result<Vec<Inspiration>> {
        let rows = sqlx::query_as::<_, Inspiration>(&format!(
            r#"
            SELECT {INSPIRATION_COLUMNS}
              FROM inspirations
             ORDER BY created_at DESC
             LIMIT $1 OFFSET $2
            "#
        ))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.db)
        .await
        .context("list inspirations")?;
        Ok(rows)
    }

    async fn count_inspirations(&self) -> anyhow::Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inspirations")
            .fetch_one(&self.db)
            .await
            .context("count inspirations")?;
        Ok(total)
    }

    async fn find_inspiration_by_slug(&self, slug: &str) -> anyhow::Result<Option<Inspiration>> {
        let row = sqlx::query_as::<_, Inspiration>(&format!(
            "SELECT {INSPIRATION_COLUMNS} FROM inspirations WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.db)
        .await
        .context("find inspiration by slug")?;
        Ok(row)
    }

    async fn list_products(&self, category_slug: Option<&str>, page: Page) -> anyhow::Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
              FROM products
             WHERE ($1::text IS NULL
                    OR category_id = (SELECT id FROM categories WHERE slug = $1))
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(category_slug)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.db)
        .await
        .context("list products")?;
        Ok(rows)
    }

    async fn count_products(&self, category_slug: Option<&str>) -> anyhow::Result<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
              FROM products
             WHERE ($1::text IS NULL
                    OR category_id = (SELECT id FROM categories WHERE slug = $1))
            "#,
        )
        .bind(category_slug)
        .fetch_one(&self.db)
        .await
        .context("count products")?;
        Ok(total)
    }

    async fn find_product(&self, id: Uuid) -> anyhow::Result<Option<Product>> {
        let row = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find product")?;
        Ok(row)
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.db)
        .await
        .context("products by ids")?;
        Ok(rows)
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> anyhow::Result<Option<Product>> {
        let row = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
               SET name        = COALESCE($2, name),
                   description = COALESCE($3, description),
                   price       = COALESCE($4, price),
                   stock       = COALESCE($5, stock),
                   images      = COALESCE($6, images),
                   updated_at  = now()
             WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.description)
        .bind(patch.price)
        .bind(patch.stock)
        .bind(patch.images)
        .fetch_optional(&self.db)
        .await
        .context("update product")?;
        Ok(row)
    }
}
