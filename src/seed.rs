//! One-shot JSON snapshots of the catalog under the public directory.
//!
//! A snapshot is written only while its file is absent or blank, so calling
//! the endpoint again after the first success is a no-op.

use std::path::{Path as FsPath, PathBuf};

use anyhow::Context;
use axum::{
    extract::State,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{catalog::repo_types::Page, error::ApiError, extract::ApiPath, state::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Categories,
    SubCategories,
    Products,
    Inspirations,
}

impl Collection {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "categories" => Some(Self::Categories),
            "subcategories" => Some(Self::SubCategories),
            "products" => Some(Self::Products),
            "inspirations" => Some(Self::Inspirations),
            _ => None,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Categories => "categories.json",
            Self::SubCategories => "subcategories.json",
            Self::Products => "products.json",
            Self::Inspirations => "inspirations.json",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SeedResponse {
    pub written: bool,
}

pub fn seed_routes() -> Router<AppState> {
    Router::new().route("/seed/:collection", post(save_snapshot))
}

pub fn snapshot_path(public_dir: &str, collection: Collection) -> PathBuf {
    FsPath::new(public_dir).join(collection.file_name())
}

async fn is_populated(path: &FsPath) -> anyhow::Result<bool> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(!contents.trim().is_empty()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}

/// Writes `value` as pretty JSON unless the file already has content.
pub async fn write_if_empty<T: Serialize + ?Sized>(path: &FsPath, value: &T) -> anyhow::Result<bool> {
    if is_populated(path).await? {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(value).context("serialize snapshot")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("write {}", path.display()))?;
    Ok(true)
}

#[instrument(skip(state))]
pub async fn save_snapshot(
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
) -> Result<Json<SeedResponse>, ApiError> {
    let collection =
        Collection::parse(&name).ok_or_else(|| ApiError::validation("Unknown collection"))?;
    let path = snapshot_path(&state.config.public_dir, collection);
    if is_populated(&path).await? {
        return Ok(Json(SeedResponse { written: false }));
    }

    let catalog = &state.catalog;
    let written = match collection {
        Collection::Categories => write_if_empty(&path, &catalog.list_categories().await?).await?,
        Collection::SubCategories => {
            write_if_empty(&path, &catalog.list_subcategories(None).await?).await?
        }
        Collection::Products => {
            write_if_empty(&path, &catalog.list_products(None, Page::ALL).await?).await?
        }
        Collection::Inspirations => {
            write_if_empty(&path, &catalog.list_inspirations(Page::ALL).await?).await?
        }
    };

    info!(path = %path.display(), written, "catalog snapshot");
    Ok(Json(SeedResponse { written }))
}
