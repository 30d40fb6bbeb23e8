use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request,
    },
    http::request::Parts,
    Json,
};
use tracing::warn;

use crate::error::ApiError;

/// `Json` whose rejections come back as a 400 `ApiError` body.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}

/// `Query` whose rejections come back as a 400 `ApiError` body.
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        Ok(ApiQuery(value))
    }
}

/// `Path` whose segments either parse or name nothing: a rejection is a 404 `ApiError`.
#[derive(Debug)]
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let uri = parts.uri.clone();
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                warn!(%uri, reason = %rejection.body_text(), "unmatched path parameter");
                ApiError::not_found("Not found")
            })?;
        Ok(ApiPath(value))
    }
}
