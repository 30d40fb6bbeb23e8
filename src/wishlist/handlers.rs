use std::collections::HashSet;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser, error::ApiError, extract::ApiJson, state::AppState,
    wishlist::repo::WishlistEntry,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub product_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub wishlisted_products: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    pub product_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub wishlisted: bool,
}

#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    pub items: Vec<WishlistEntry>,
}

pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/wishlist", get(get_wishlist))
        .route("/wishlist/check", post(check))
        .route("/wishlist/toggle", post(toggle))
}

#[instrument(skip(state))]
pub async fn get_wishlist(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<WishlistResponse>, ApiError> {
    let items = state.wishlists.entries(user_id).await?;
    Ok(Json(WishlistResponse { items }))
}

#[instrument(skip(state, payload))]
pub async fn check(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<CheckRequest>,
) -> Result<Json<CheckResponse>, ApiError> {
    let ids = payload
        .product_ids
        .ok_or_else(|| ApiError::validation("productIds is required"))?;
    if ids.is_empty() {
        return Ok(Json(CheckResponse {
            wishlisted_products: Vec::new(),
        }));
    }

    let present: HashSet<Uuid> = state
        .wishlists
        .wishlisted_among(user_id, &ids)
        .await?
        .into_iter()
        .collect();
    let mut seen = HashSet::new();
    let wishlisted_products = ids
        .into_iter()
        .filter(|id| present.contains(id) && seen.insert(*id))
        .collect();

    Ok(Json(CheckResponse {
        wishlisted_products,
    }))
}

#[instrument(skip(state, payload))]
pub async fn toggle(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<ToggleRequest>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let product_id = payload
        .product_id
        .ok_or_else(|| ApiError::validation("productId is required"))?;
    if state.catalog.find_product(product_id).await?.is_none() {
        return Err(ApiError::not_found("Product not found"));
    }

    let wishlisted = state.wishlists.toggle(user_id, product_id).await?;
    info!(%user_id, %product_id, wishlisted, "wishlist toggled");
    Ok(Json(ToggleResponse { wishlisted }))
}
