use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::repo_types::{Category, Inspiration, Page, Product};

pub const DEFAULT_PAGE_SIZE: i64 = 12;
pub const MAX_PAGE_SIZE: i64 = 50;

/// Query numbers that don't parse fall back to their default.
fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.and_then(|v| v.trim().parse().ok()))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default, deserialize_with = "lenient_number")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub limit: Option<i64>,
}

impl PageQuery {
    /// 1-based page number and a clamped page size.
    pub fn resolve(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }

    pub fn window(&self) -> Page {
        let (page, limit) = self.resolve();
        Page {
            limit,
            offset: (page - 1).saturating_mul(limit),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

/// `categoryId` stays raw so a malformed id can answer `[]` instead of a rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubCategoryQuery {
    pub category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub limit: Option<i64>,
}

impl ProductQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InspirationPage {
    pub inspirations: Vec<Inspiration>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspirationDetails {
    #[serde(flatten)]
    pub inspiration: Inspiration,
    pub categories: Vec<Category>,
    pub image_url: Option<String>,
}
