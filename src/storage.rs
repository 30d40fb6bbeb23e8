use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;

use crate::config::StorageConfig;

/// Object store in front of the image CDN.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    /// Public CDN URL of `key`. Values that already are absolute URLs pass through.
    fn public_url(&self, key: &str) -> String;
}

pub(crate) fn join_url(base: &str, key: &str) -> String {
    if key.starts_with("http://") || key.starts_with("https://") {
        return key.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    public_base: String,
}

impl Storage {
    pub async fn new(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_base: cfg.cdn_base_url.clone(),
        })
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base, key)
    }
}
