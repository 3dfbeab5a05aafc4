//! Blob storage adapter for uploaded documents.
//!
//! Supports both local filesystem and S3-compatible object storage. Objects
//! are addressed by bucket and key; keys are namespaced by tenant, product,
//! participant and field so that tenants sharing a bucket never collide.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use crate::{AppError, AppResult, TenantScope};

/// Metadata of an object written to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object key inside the bucket.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// MD5 checksum of the content.
    pub md5: String,
}

/// Storage backend trait.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write an object.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> AppResult<StoredObject>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> AppResult<()>;

    /// Check if an object exists.
    async fn exists(&self, bucket: &str, key: &str) -> AppResult<bool>;
}

/// Shared handle to a storage backend.
pub type SharedStorage = Arc<dyn StorageBackend>;

/// Local filesystem storage backend. Each bucket is a directory under the base path.
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend.
    #[must_use]
    pub const fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn path_for(&self, bucket: &str, key: &str) -> AppResult<PathBuf> {
        if key.split('/').any(|segment| segment == ".." || segment.is_empty()) {
            return Err(AppError::Storage(format!("Invalid object key: {key}")));
        }
        Ok(self.base_path.join(bucket).join(key))
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> AppResult<StoredObject> {
        let path = self.path_for(bucket, key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {e}")))?;
        }

        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write file: {e}")))?;

        Ok(StoredObject {
            key: key.to_string(),
            size: data.len() as u64,
            md5: format!("{:x}", md5::compute(&data)),
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> AppResult<()> {
        let path = self.path_for(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("Failed to delete file: {e}"))),
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> AppResult<bool> {
        let path = self.path_for(bucket, key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to stat file: {e}")))
    }
}

/// S3-compatible object storage backend.
#[cfg(feature = "s3")]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
}

#[cfg(feature = "s3")]
impl S3Storage {
    /// Create a new S3 storage backend.
    #[must_use]
    pub fn new(endpoint: &str, region: &str, access_key_id: &str, secret_access_key: &str) -> Self {
        use aws_config::Region;
        use aws_sdk_s3::config::Credentials;

        let credentials =
            Credentials::new(access_key_id, secret_access_key, None, None, "enrollment");

        let config = aws_sdk_s3::Config::builder()
            .endpoint_url(endpoint)
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }
}

#[cfg(feature = "s3")]
#[async_trait::async_trait]
impl StorageBackend for S3Storage {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> AppResult<StoredObject> {
        use aws_sdk_s3::primitives::ByteStream;

        let size = data.len() as u64;
        let md5 = format!("{:x}", md5::compute(&data));

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {e}")))?;

        Ok(StoredObject {
            key: key.to_string(),
            size,
            md5,
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 delete failed: {e}")))?;

        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> AppResult<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(AppError::Storage(format!(
                        "S3 head_object failed: {service_error}"
                    )))
                }
            }
        }
    }
}

/// Build the object key for an uploaded document.
///
/// Layout: `{tenant}/{product}/{participant}/{field}/{object}.{ext}`.
#[must_use]
pub fn object_key(
    scope: &TenantScope,
    participant_id: &str,
    field_name: &str,
    object_name: &str,
    original_name: &str,
) -> String {
    let extension = original_name
        .rfind('.')
        .filter(|&pos| pos > 0 && pos < original_name.len() - 1)
        .map(|pos| &original_name[pos + 1..])
        .filter(|ext| ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map_or_else(|| "bin".to_string(), str::to_ascii_lowercase);

    format!(
        "{}/{}/{}/{}/{}.{}",
        scope.tenant_id, scope.product_id, participant_id, field_name, object_name, extension
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_layout() {
        let scope = TenantScope::new("t1", "p1");
        let key = object_key(&scope, "part1", "identity_card", "abc", "KTP.JPG");
        assert_eq!(key, "t1/p1/part1/identity_card/abc.jpg");
    }

    #[test]
    fn test_object_key_without_extension() {
        let scope = TenantScope::new("t1", "p1");
        let key = object_key(&scope, "part1", "bank_book", "abc", "scan");
        assert!(key.ends_with("/abc.bin"));

        let key = object_key(&scope, "part1", "bank_book", "abc", "../../etc/passwd.");
        assert!(key.ends_with("/abc.bin"));
    }

    #[tokio::test]
    async fn test_local_storage_roundtrip() {
        let base = std::env::temp_dir().join(format!("enrollment-test-{}", uuid::Uuid::new_v4()));
        let storage = LocalStorage::new(base.clone());

        let stored = storage
            .upload("docs", "t1/p1/a.pdf", Bytes::from_static(b"%PDF"), "application/pdf")
            .await
            .unwrap();
        assert_eq!(stored.size, 4);
        assert_eq!(stored.md5.len(), 32);
        assert!(storage.exists("docs", "t1/p1/a.pdf").await.unwrap());

        storage.delete("docs", "t1/p1/a.pdf").await.unwrap();
        assert!(!storage.exists("docs", "t1/p1/a.pdf").await.unwrap());

        // Deleting twice is not an error.
        storage.delete("docs", "t1/p1/a.pdf").await.unwrap();

        tokio::fs::remove_dir_all(base).await.ok();
    }

    #[tokio::test]
    async fn test_local_storage_rejects_traversal() {
        let storage = LocalStorage::new(std::env::temp_dir());
        let result = storage.delete("docs", "../outside").await;
        assert!(matches!(result, Err(AppError::Storage(_))));
    }
}
