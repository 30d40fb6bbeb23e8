use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::auth::repo::{PgUserRepo, UserRepo};
use crate::cart::repo::{CartRepo, PgCartRepo};
use crate::catalog::repo::{CatalogRepo, PgCatalogRepo};
use crate::config::AppConfig;
use crate::retry::RetryPolicy;
use crate::reviews::repo::{PgReviewRepo, ReviewRepo};
use crate::storage::{Storage, StorageClient};
use crate::wishlist::repo::{PgWishlistRepo, WishlistRepo};

/// Application-lifetime resources, built once at startup and cloned into
/// every handler through axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub catalog: Arc<dyn CatalogRepo>,
    pub wishlists: Arc<dyn WishlistRepo>,
    pub reviews: Arc<dyn ReviewRepo>,
    pub carts: Arc<dyn CartRepo>,
    pub storage: Arc<dyn StorageClient>,
    pub retry: RetryPolicy,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;

        Ok(Self {
            users: Arc::new(PgUserRepo::new(db.clone())),
            catalog: Arc::new(PgCatalogRepo::new(db.clone())),
            wishlists: Arc::new(PgWishlistRepo::new(db.clone())),
            reviews: Arc::new(PgReviewRepo::new(db.clone())),
            carts: Arc::new(PgCartRepo::new(db)),
            storage,
            config,
            retry: RetryPolicy::default(),
        })
    }
}
