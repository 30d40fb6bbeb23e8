use axum::{extract::State, routing::get, Json, Router};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::{
    catalog::{
        dto::{
            InspirationDetails, InspirationPage, PageQuery, Pagination, ProductPage, ProductQuery,
            SubCategoryQuery,
        },
        repo_types::{Category, Product, ProductPatch, SubCategory},
    },
    error::ApiError,
    extract::{ApiJson, ApiPath, ApiQuery},
    retry::retry_read,
    slug::is_valid_slug,
    state::AppState,
};

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/subcategories", get(list_subcategories))
        .route("/inspirations", get(list_inspirations))
        .route("/inspirations/:slug", get(get_inspiration))
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product).patch(update_product))
}

/// Listing endpoints answer `[]` when the read keeps failing; the failure
/// is only visible in the logs.
#[instrument(skip(state))]
pub async fn list_categories(State(state): State<AppState>) -> Json<Vec<Category>> {
    match retry_read(state.retry, || state.catalog.list_categories()).await {
        Ok(rows) => Json(rows),
        Err(failure) => {
            error!(
                error = %failure.message,
                retryable = failure.retryable,
                attempts = failure.attempts,
                "list categories failed; serving empty list"
            );
            Json(Vec::new())
        }
    }
}

#[instrument(skip(state))]
pub async fn list_subcategories(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<SubCategoryQuery>,
) -> Json<Vec<SubCategory>> {
    let raw = q.category_id.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let category_id = match raw.map(Uuid::parse_str) {
        None => None,
        Some(Ok(id)) => Some(id),
        Some(Err(_)) => {
            warn!(category_id = raw.unwrap_or_default(), "malformed category id; serving empty list");
            return Json(Vec::new());
        }
    };
    match retry_read(state.retry, || state.catalog.list_subcategories(category_id)).await {
        Ok(rows) => Json(rows),
        Err(failure) => {
            error!(
                error = %failure.message,
                retryable = failure.retryable,
                attempts = failure.attempts,
                "list subcategories failed; serving empty list"
            );
            Json(Vec::new())
        }
    }
}

#[instrument(skip(state))]
pub async fn list_inspirations(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> Result<Json<InspirationPage>, ApiError> {
    let (page, limit) = q.resolve();
    let inspirations = state.catalog.list_inspirations(q.window()).await?;
    let total = state.catalog.count_inspirations().await?;
    Ok(Json(InspirationPage {
        inspirations,
        pagination: Pagination::new(page, limit, total),
    }))
}

#[instrument(skip(state))]
pub async fn get_inspiration(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<InspirationDetails>, ApiError> {
    let slug = slug.trim().to_lowercase();
    if !is_valid_slug(&slug) {
        warn!(slug = %slug, "malformed inspiration slug");
        return Err(ApiError::validation("Invalid inspiration slug"));
    }

    let inspiration = state
        .catalog
        .find_inspiration_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found("Inspiration not found"))?;

    let categories = if inspiration.category_ids.is_empty() {
        Vec::new()
    } else {
        state.catalog.categories_by_ids(&inspiration.category_ids).await?
    };
    let image_url = inspiration.image.as_deref().map(|img| state.storage.public_url(img));

    Ok(Json(InspirationDetails {
        inspiration,
        categories,
        image_url,
    }))
}

#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<ProductQuery>,
) -> Result<Json<ProductPage>, ApiError> {
    let pq = q.page_query();
    let (page, limit) = pq.resolve();
    let category = q.category.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let products = state.catalog.list_products(category, pq.window()).await?;
    let total = state.catalog.count_products(category).await?;
    Ok(Json(ProductPage {
        products,
        pagination: Pagination::new(page, limit, total),
    }))
}

#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Product>, ApiError> {
    let product = state
        .catalog
        .find_product(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    Ok(Json(product))
}

fn validate_patch(patch: &ProductPatch) -> Result<(), ApiError> {
    if matches!(&patch.name, Some(n) if n.trim().is_empty()) {
        return Err(ApiError::validation("Name cannot be empty"));
    }
    if matches!(patch.price, Some(p) if !p.is_finite() || p < 0.0) {
        return Err(ApiError::validation("Price must be a non-negative number"));
    }
    if matches!(patch.stock, Some(s) if s < 0) {
        return Err(ApiError::validation("Stock cannot be negative"));
    }
    Ok(())
}

#[instrument(skip(state, patch))]
pub async fn update_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> Result<Json<Product>, ApiError> {
    validate_patch(&patch)?;
    let product = state
        .catalog
        .update_product(id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    Ok(Json(product))
}
