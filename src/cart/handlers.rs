use std::collections::HashMap;

use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::ApiError,
    extract::{ApiJson, ApiPath},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: Option<Uuid>,
    pub quantity: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub name: String,
    pub price: f64,
    pub image: Option<String>,
    pub quantity: i32,
    pub line_total: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub items: Vec<CartItem>,
    pub total_quantity: i64,
    pub subtotal: f64,
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/items/:product_id", delete(remove_item))
}

/// Joins the stored lines with current product data. Lines whose product
/// has disappeared are left out.
async fn load_cart(state: &AppState, user_id: Uuid) -> Result<CartResponse, ApiError> {
    let lines = state.carts.lines(user_id).await?;
    let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
    let products: HashMap<Uuid, _> = state
        .catalog
        .products_by_ids(&ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let items: Vec<CartItem> = lines
        .into_iter()
        .filter_map(|line| {
            let product = products.get(&line.product_id)?;
            Some(CartItem {
                product_id: line.product_id,
                name: product.name.clone(),
                price: product.price,
                image: product.images.first().cloned(),
                quantity: line.quantity,
                line_total: product.price * f64::from(line.quantity),
            })
        })
        .collect();

    Ok(CartResponse {
        total_quantity: items.iter().map(|i| i64::from(i.quantity)).sum(),
        subtotal: items.iter().map(|i| i.line_total).sum(),
        items,
    })
}

#[instrument(skip(state))]
pub async fn get_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<CartResponse>, ApiError> {
    Ok(Json(load_cart(&state, user_id).await?))
}

#[instrument(skip(state, payload))]
pub async fn add_item(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id = payload
        .product_id
        .ok_or_else(|| ApiError::validation("productId is required"))?;
    let quantity = payload.quantity.unwrap_or(1);
    if quantity < 1 {
        return Err(ApiError::validation("Quantity must be at least 1"));
    }
    if state.catalog.find_product(product_id).await?.is_none() {
        return Err(ApiError::not_found("Product not found"));
    }

    state.carts.add(user_id, product_id, quantity).await?;
    info!(%user_id, %product_id, quantity, "cart item added");
    Ok(Json(load_cart(&state, user_id).await?))
}

#[instrument(skip(state))]
pub async fn remove_item(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(product_id): ApiPath<Uuid>,
) -> Result<Json<CartResponse>, ApiError> {
    state.carts.remove(user_id, product_id).await?;
    Ok(Json(load_cart(&state, user_id).await?))
}
