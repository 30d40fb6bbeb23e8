use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

use crate::storage::StorageClient;

pub struct StoredObject {
    pub key: String,
    pub url: String,
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/avif" => Some("avif"),
        _ => None,
    }
}

/// Stores an image under a fresh `uploads/<uuid>.<ext>` key.
pub async fn store_image(
    storage: &dyn StorageClient,
    body: Bytes,
    content_type: &str,
) -> anyhow::Result<StoredObject> {
    let ext = ext_from_mime(content_type)
        .with_context(|| format!("unsupported content type {content_type}"))?;
    let key = format!("uploads/{}.{}", Uuid::new_v4(), ext);
    storage
        .put_object(&key, body, content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    let url = storage.public_url(&key);
    Ok(StoredObject { key, url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStorage;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/avif"), Some("avif"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
        assert_eq!(ext_from_mime("whatever/else"), None);
    }

    #[tokio::test]
    async fn stores_under_uploads_prefix() {
        let storage = FakeStorage::default();
        let obj = store_image(&storage, Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();
        assert!(obj.key.starts_with("uploads/"));
        assert!(obj.key.ends_with(".png"));
        assert_eq!(obj.url, format!("https://cdn.test/{}", obj.key));
        assert_eq!(storage.keys(), vec![obj.key]);
    }
}
