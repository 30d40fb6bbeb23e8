use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, StoreError},
    extract::{ApiJson, ApiPath},
    reviews::repo_types::{NewReview, Review, ReviewStatus, FLAG_THRESHOLD},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRef {
    pub review_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub product_id: Option<Uuid>,
    pub rating: Option<i32>,
    pub title: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub reported_count: i32,
    pub status: ReviewStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpfulResponse {
    pub helpful_count: i32,
}

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/reviews", post(create_review))
        .route("/reviews/report", post(report_review))
        .route("/reviews/helpful", post(mark_helpful))
        .route("/products/:id/reviews", get(list_reviews))
}

/// Loads a review some other user wrote; authors can't act on their own.
async fn others_review(
    state: &AppState,
    user_id: Uuid,
    review_id: Option<Uuid>,
    own_message: &'static str,
) -> Result<Review, ApiError> {
    let review_id = review_id.ok_or_else(|| ApiError::validation("reviewId is required"))?;
    let review = state
        .reviews
        .find(review_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    if review.user_id == user_id {
        warn!(%user_id, %review_id, "user acted on own review");
        return Err(ApiError::validation(own_message));
    }
    Ok(review)
}

#[instrument(skip(state, payload))]
pub async fn report_review(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<ReviewRef>,
) -> Result<Json<ReportResponse>, ApiError> {
    let review = others_review(
        &state,
        user_id,
        payload.review_id,
        "You cannot report your own review",
    )
    .await?;

    let Some(review) = state
        .reviews
        .record_report(review.id, user_id, FLAG_THRESHOLD)
        .await?
    else {
        warn!(review_id = %review.id, %user_id, "repeat report ignored");
        return Err(ApiError::Conflict("You have already reported this review".into()));
    };
    info!(review_id = %review.id, reported_count = review.reported_count, status = ?review.status, "review reported");
    Ok(Json(ReportResponse {
        reported_count: review.reported_count,
        status: review.status,
    }))
}

#[instrument(skip(state, payload))]
pub async fn mark_helpful(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<ReviewRef>,
) -> Result<Json<HelpfulResponse>, ApiError> {
    let review = others_review(
        &state,
        user_id,
        payload.review_id,
        "You cannot vote on your own review",
    )
    .await?;

    let review = state.reviews.record_helpful(review.id).await?;
    Ok(Json(HelpfulResponse {
        helpful_count: review.helpful_count,
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_review(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let product_id = payload
        .product_id
        .ok_or_else(|| ApiError::validation("productId is required"))?;
    let rating = payload
        .rating
        .filter(|r| (1..=5).contains(r))
        .ok_or_else(|| ApiError::validation("Rating must be between 1 and 5"))?;
    let comment = payload
        .comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::validation("Comment is required"))?;

    if state.catalog.find_product(product_id).await?.is_none() {
        return Err(ApiError::not_found("Product not found"));
    }

    let review = state
        .reviews
        .create(NewReview {
            product_id,
            user_id,
            rating,
            title: payload.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            comment,
        })
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => {
                ApiError::Conflict("You have already reviewed this product".into())
            }
            other => other.into(),
        })?;

    info!(review_id = %review.id, %product_id, "review created");
    Ok((StatusCode::CREATED, Json(review)))
}

#[instrument(skip(state))]
pub async fn list_reviews(
    State(state): State<AppState>,
    ApiPath(product_id): ApiPath<Uuid>,
) -> Result<Json<Vec<Review>>, ApiError> {
    Ok(Json(state.reviews.list_published(product_id).await?))
}
