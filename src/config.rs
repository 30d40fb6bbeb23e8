use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Public base URL uploaded objects are served from.
    pub cdn_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    /// Marks auth cookies `Secure`.
    pub secure_cookies: bool,
    pub public_dir: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

        let jwt = JwtConfig {
            access_secret: std::env::var("JWT_ACCESS_SECRET")
                .context("JWT_ACCESS_SECRET is not set")?,
            refresh_secret: std::env::var("JWT_REFRESH_SECRET")
                .context("JWT_REFRESH_SECRET is not set")?,
            issuer: env_or("JWT_ISSUER", "storefront"),
            audience: env_or("JWT_AUDIENCE", "storefront-web"),
            access_ttl_minutes: env_parse_or("JWT_ACCESS_TTL_MINUTES", 15),
            refresh_ttl_days: env_parse_or("JWT_REFRESH_TTL_DAYS", 7),
        };
        anyhow::ensure!(
            jwt.access_secret != jwt.refresh_secret,
            "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ"
        );

        let endpoint = env_or("STORAGE_ENDPOINT", "http://localhost:9000");
        let bucket = env_or("STORAGE_BUCKET", "storefront");
        let cdn_base_url = std::env::var("CDN_BASE_URL")
            .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
        let storage = StorageConfig {
            access_key: env_or("STORAGE_ACCESS_KEY", "minioadmin"),
            secret_key: env_or("STORAGE_SECRET_KEY", "minioadmin"),
            region: env_or("STORAGE_REGION", "us-east-1"),
            endpoint,
            bucket,
            cdn_base_url,
        };

        Ok(Self {
            database_url,
            jwt,
            storage,
            secure_cookies: env_or("APP_ENV", "development") == "production",
            public_dir: env_or("PUBLIC_DIR", "public"),
        })
    }
}
