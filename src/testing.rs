//! In-memory stand-ins for the Postgres repositories and the object store,
//! plus a router harness for handler tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::{
    async_trait,
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use axum_extra::extract::cookie::Cookie;
use bytes::Bytes;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    app::build_app,
    auth::{
        jwt::{test_config, JwtKeys},
        repo::UserRepo,
        repo_types::{NewUser, User},
    },
    cart::repo::{CartLine, CartRepo},
    catalog::{
        repo::CatalogRepo,
        repo_types::{Category, Inspiration, Page, Product, ProductPatch, SubCategory},
    },
    config::{AppConfig, StorageConfig},
    error::StoreError,
    retry::RetryPolicy,
    reviews::{
        repo::ReviewRepo,
        repo_types::{NewReview, Review, ReviewStatus},
    },
    state::AppState,
    storage::{join_url, StorageClient},
    wishlist::repo::{WishlistEntry, WishlistRepo},
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn window<T: Clone>(rows: Vec<T>, page: Page) -> Vec<T> {
    rows.into_iter()
        .skip(page.offset.max(0) as usize)
        .take(page.limit.max(0).try_into().unwrap_or(usize::MAX))
        .collect()
}

#[derive(Default)]
pub struct MemoryUserRepo {
    users: Mutex<Vec<User>>,
}

impl MemoryUserRepo {
    pub fn set_reset_code(&self, email: &str, code_hash: &str, expires: Option<OffsetDateTime>) {
        let mut users = lock(&self.users);
        if let Some(u) = users.iter_mut().find(|u| u.email == email) {
            u.reset_code_hash = Some(code_hash.to_string());
            u.reset_code_expires = expires;
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.users).len()
    }

    pub fn get_by_email(&self, email: &str) -> Option<User> {
        lock(&self.users).iter().find(|u| u.email == email).cloned()
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.get_by_email(email))
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(lock(&self.users).iter().find(|u| u.id == id).cloned())
    }

    async fn slug_exists(&self, slug: &str) -> anyhow::Result<bool> {
        Ok(lock(&self.users).iter().any(|u| u.slug == slug))
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = lock(&self.users);
        if users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("email"));
        }
        if users.iter().any(|u| u.slug == user.slug) {
            return Err(StoreError::Duplicate("slug"));
        }
        if user.phone.is_some() && users.iter().any(|u| u.phone == user.phone) {
            return Err(StoreError::Duplicate("phone"));
        }
        let now = OffsetDateTime::now_utc();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            slug: user.slug,
            email: user.email,
            password_hash: Some(user.password_hash),
            phone: user.phone,
            photo_url: user.photo_url,
            has_oauth: user.has_oauth,
            reset_code_hash: None,
            reset_code_expires: None,
            created_at: now,
            updated_at: now,
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn link_oauth(&self, id: Uuid, photo_url: Option<String>) -> anyhow::Result<User> {
        let mut users = lock(&self.users);
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| anyhow::anyhow!("no user {id}"))?;
        user.has_oauth = true;
        user.photo_url = photo_url;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }
}

#[derive(Default)]
pub struct MemoryCatalogRepo {
    categories: Mutex<Vec<Category>>,
    subcategories: Mutex<Vec<SubCategory>>,
    products: Mutex<Vec<Product>>,
    inspirations: Mutex<Vec<Inspiration>>,
    /// When set, every listing read fails with this message.
    failure: Mutex<Option<String>>,
}

impl MemoryCatalogRepo {
    pub fn fail_reads_with(&self, message: &str) {
        *lock(&self.failure) = Some(message.to_string());
    }

    fn check(&self) -> anyhow::Result<()> {
        match lock(&self.failure).as_ref() {
            Some(msg) => Err(anyhow::anyhow!("{msg}")),
            None => Ok(()),
        }
    }

    pub fn add_category(&self, name: &str, slug: &str) -> Category {
        let now = OffsetDateTime::now_utc();
        let category = Category {
            id: Uuid::new_v4(),
            name: name.into(),
            slug: slug.into(),
            description: None,
            image: None,
            created_at: now,
            updated_at: now,
        };
        lock(&self.categories).push(category.clone());
        category
    }

    pub fn add_product(&self, category_id: Uuid, name: &str, price: f64) -> Product {
        let now = OffsetDateTime::now_utc();
        let product = Product {
            id: Uuid::new_v4(),
            category_id,
            subcategory_id: None,
            name: name.into(),
            slug: crate::slug::slugify(name),
            description: None,
            price,
            stock: 10,
            images: vec![format!("products/{}.jpg", crate::slug::slugify(name))],
            created_at: now,
            updated_at: now,
        };
        lock(&self.products).push(product.clone());
        product
    }

    pub fn add_inspiration(&self, title: &str, slug: &str, category_ids: Vec<Uuid>) -> Inspiration {
        let now = OffsetDateTime::now_utc();
        let inspiration = Inspiration {
            id: Uuid::new_v4(),
            title: title.into(),
            slug: slug.into(),
            description: None,
            image: Some(format!("inspirations/{slug}.jpg")),
            category_ids,
            created_at: now,
            updated_at: now,
        };
        lock(&self.inspirations).push(inspiration.clone());
        inspiration
    }

    fn products_in(&self, category_slug: Option<&str>) -> Vec<Product> {
        let category_id = category_slug.map(|slug| {
            lock(&self.categories)
                .iter()
                .find(|c| c.slug == slug)
                .map(|c| c.id)
        });
        lock(&self.products)
            .iter()
            .filter(|p| match category_id {
                None => true,
                Some(id) => Some(p.category_id) == id,
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CatalogRepo for MemoryCatalogRepo {
    async fn list_categories(&self) -> anyhow::Result<Vec<Category>> {
        self.check()?;
        let mut rows = lock(&self.categories).clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn categories_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Category>> {
        let mut rows: Vec<Category> = lock(&self.categories)
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn list_subcategories(&self, category_id: Option<Uuid>) -> anyhow::Result<Vec<SubCategory>> {
        self.check()?;
        Ok(lock(&self.subcategories)
            .iter()
            .filter(|s| category_id.map_or(true, |id| s.category_id == id))
            .cloned()
            .collect())
    }

    async fn list_inspirations(&self, page: Page) -> anyhow::Result<Vec<Inspiration>> {
        self.check()?;
        let mut rows = lock(&self.inspirations).clone();
        rows.reverse();
        Ok(window(rows, page))
    }

    async fn count_inspirations(&self) -> anyhow::Result<i64> {
        Ok(lock(&self.inspirations).len() as i64)
    }

    async fn find_inspiration_by_slug(&self, slug: &str) -> anyhow::Result<Option<Inspiration>> {
        Ok(lock(&self.inspirations).iter().find(|i| i.slug == slug).cloned())
    }

    async fn list_products(&self, category_slug: Option<&str>, page: Page) -> anyhow::Result<Vec<Product>> {
        self.check()?;
        let mut rows = self.products_in(category_slug);
        rows.reverse();
        Ok(window(rows, page))
    }

    async fn count_products(&self, category_slug: Option<&str>) -> anyhow::Result<i64> {
        Ok(self.products_in(category_slug).len() as i64)
    }

    async fn find_product(&self, id: Uuid) -> anyhow::Result<Option<Product>> {
        Ok(lock(&self.products).iter().find(|p| p.id == id).cloned())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Product>> {
        Ok(lock(&self.products)
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> anyhow::Result<Option<Product>> {
        let mut products = lock(&self.products);
        let Some(p) = products.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            p.name = name;
        }
        if let Some(description) = patch.description {
            p.description = Some(description);
        }
        if let Some(price) = patch.price {
            p.price = price;
        }
        if let Some(stock) = patch.stock {
            p.stock = stock;
        }
        if let Some(images) = patch.images {
            p.images = images;
        }
        p.updated_at = OffsetDateTime::now_utc();
        Ok(Some(p.clone()))
    }
}

#[derive(Default)]
pub struct MemoryWishlistRepo {
    items: Mutex<Vec<(Uuid, WishlistEntry)>>,
}

#[async_trait]
impl WishlistRepo for MemoryWishlistRepo {
    async fn entries(&self, user_id: Uuid) -> anyhow::Result<Vec<WishlistEntry>> {
        Ok(lock(&self.items)
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn wishlisted_among(&self, user_id: Uuid, product_ids: &[Uuid]) -> anyhow::Result<Vec<Uuid>> {
        Ok(lock(&self.items)
            .iter()
            .filter(|(owner, e)| *owner == user_id && product_ids.contains(&e.product_id))
            .map(|(_, e)| e.product_id)
            .collect())
    }

    async fn toggle(&self, user_id: Uuid, product_id: Uuid) -> anyhow::Result<bool> {
        let mut items = lock(&self.items);
        let before = items.len();
        items.retain(|(owner, e)| !(*owner == user_id && e.product_id == product_id));
        if items.len() < before {
            return Ok(false);
        }
        items.push((
            user_id,
            WishlistEntry {
                product_id,
                added_at: OffsetDateTime::now_utc(),
            },
        ));
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemoryReviewRepo {
    reviews: Mutex<Vec<Review>>,
    reporters: Mutex<HashSet<(Uuid, Uuid)>>,
}

impl MemoryReviewRepo {
    pub fn get(&self, id: Uuid) -> Option<Review> {
        lock(&self.reviews).iter().find(|r| r.id == id).cloned()
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut Review)) -> anyhow::Result<Review> {
        let mut reviews = lock(&self.reviews);
        let review = reviews
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("no review {id}"))?;
        f(review);
        review.updated_at = OffsetDateTime::now_utc();
        Ok(review.clone())
    }
}

#[async_trait]
impl ReviewRepo for MemoryReviewRepo {
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Review>> {
        Ok(self.get(id))
    }

    async fn create(&self, review: NewReview) -> Result<Review, StoreError> {
        let mut reviews = lock(&self.reviews);
        if reviews
            .iter()
            .any(|r| r.product_id == review.product_id && r.user_id == review.user_id)
        {
            return Err(StoreError::Duplicate("user_id"));
        }
        let now = OffsetDateTime::now_utc();
        let created = Review {
            id: Uuid::new_v4(),
            product_id: review.product_id,
            user_id: review.user_id,
            rating: review.rating,
            title: review.title,
            comment: review.comment,
            status: ReviewStatus::Published,
            reported_count: 0,
            helpful_count: 0,
            created_at: now,
            updated_at: now,
        };
        reviews.push(created.clone());
        Ok(created)
    }

    async fn list_published(&self, product_id: Uuid) -> anyhow::Result<Vec<Review>> {
        let mut rows: Vec<Review> = lock(&self.reviews)
            .iter()
            .filter(|r| r.product_id == product_id && r.status == ReviewStatus::Published)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }

    async fn record_report(
        &self,
        id: Uuid,
        reporter_id: Uuid,
        flag_threshold: i32,
    ) -> anyhow::Result<Option<Review>> {
        if !lock(&self.reporters).insert((id, reporter_id)) {
            return Ok(None);
        }
        self.update(id, |r| {
            r.reported_count += 1;
            if r.reported_count >= flag_threshold {
                r.status = ReviewStatus::Flagged;
            }
        })
        .map(Some)
    }

    async fn record_helpful(&self, id: Uuid) -> anyhow::Result<Review> {
        self.update(id, |r| r.helpful_count += 1)
    }
}

#[derive(Default)]
pub struct MemoryCartRepo {
    lines: Mutex<Vec<(Uuid, CartLine)>>,
}

#[async_trait]
impl CartRepo for MemoryCartRepo {
    async fn lines(&self, user_id: Uuid) -> anyhow::Result<Vec<CartLine>> {
        Ok(lock(&self.lines)
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, l)| l.clone())
            .collect())
    }

    async fn add(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> anyhow::Result<()> {
        let mut lines = lock(&self.lines);
        match lines
            .iter_mut()
            .find(|(owner, l)| *owner == user_id && l.product_id == product_id)
        {
            Some((_, line)) => line.quantity += quantity,
            None => lines.push((user_id, CartLine { product_id, quantity })),
        }
        Ok(())
    }

    async fn remove(&self, user_id: Uuid, product_id: Uuid) -> anyhow::Result<bool> {
        let mut lines = lock(&self.lines);
        let before = lines.len();
        lines.retain(|(owner, l)| !(*owner == user_id && l.product_id == product_id));
        Ok(lines.len() < before)
    }
}

pub const CDN_BASE: &str = "https://cdn.test";

/// Records uploaded keys instead of talking to S3.
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<Vec<(String, Bytes)>>,
}

impl FakeStorage {
    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).iter().map(|(k, _)| k.clone()).collect()
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        lock(&self.objects).push((key.to_string(), body));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(CDN_BASE, key)
    }
}

/// Application wired to in-memory stores, with handles kept for seeding.
pub struct TestApp {
    pub state: AppState,
    pub users: Arc<MemoryUserRepo>,
    pub catalog: Arc<MemoryCatalogRepo>,
    pub reviews: Arc<MemoryReviewRepo>,
    pub storage: Arc<FakeStorage>,
    _public_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let public_dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            database_url: String::new(),
            jwt: test_config(),
            storage: StorageConfig {
                endpoint: "http://storage.test".into(),
                bucket: "test".into(),
                access_key: "test".into(),
                secret_key: "test".into(),
                region: "us-east-1".into(),
                cdn_base_url: CDN_BASE.into(),
            },
            secure_cookies: false,
            public_dir: public_dir.path().to_string_lossy().into_owned(),
        };

        let users = Arc::new(MemoryUserRepo::default());
        let catalog = Arc::new(MemoryCatalogRepo::default());
        let reviews = Arc::new(MemoryReviewRepo::default());
        let storage = Arc::new(FakeStorage::default());

        let state = AppState {
            config: Arc::new(config),
            users: users.clone(),
            catalog: catalog.clone(),
            wishlists: Arc::new(MemoryWishlistRepo::default()),
            reviews: reviews.clone(),
            carts: Arc::new(MemoryCartRepo::default()),
            storage: storage.clone(),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: std::time::Duration::from_millis(1),
            },
        };

        Self {
            state,
            users,
            catalog,
            reviews,
            storage,
            _public_dir: public_dir,
        }
    }

    pub fn router(&self) -> Router {
        build_app(self.state.clone())
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router().oneshot(req).await.expect("infallible router")
    }

    /// `Cookie` header carrying a valid access token for `user_id`.
    pub fn access_cookie(&self, user_id: Uuid) -> String {
        let keys = JwtKeys::from(&self.state.config.jwt);
        let token = keys.sign_access(user_id).expect("sign access");
        format!("vf_access={token}")
    }

    /// `Cookie` header carrying a valid refresh token for `user_id`.
    pub fn refresh_cookie(&self, user_id: Uuid) -> String {
        let keys = JwtKeys::from(&self.state.config.jwt);
        let token = keys.sign_refresh(user_id).expect("sign refresh");
        format!("vf_refresh={token}")
    }
}

pub fn json_request(
    method: Method,
    uri: &str,
    body: serde_json::Value,
    cookie: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

pub fn empty_request(method: Method, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("request")
}

pub async fn read_json(res: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

pub fn set_cookies(res: &Response<Body>) -> Vec<Cookie<'static>> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|s| Cookie::parse(s.to_string()).ok())
        .collect()
}

/// Folds the non-empty `Set-Cookie` values into a request `Cookie` header.
pub fn cookie_header(res: &Response<Body>) -> String {
    set_cookies(res)
        .iter()
        .filter(|c| !c.value().is_empty())
        .map(|c| format!("{}={}", c.name(), c.value()))
        .collect::<Vec<_>>()
        .join("; ")
}
