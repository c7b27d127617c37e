use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::AppConfig;

/// Where uploaded files live. Documents only keep the returned key.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()>;

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

/// `documents/{owner}/{random}{.ext}`, keeping the original extension.
pub fn object_key(owner_id: Uuid, original_name: &str) -> String {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|ch| ch.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("documents/{owner_id}/{}{extension}", Uuid::new_v4())
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Path-style addressing keeps MinIO and other S3-compatible endpoints working.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let bucket = config
            .s3_bucket
            .clone()
            .context("S3_BUCKET must be set to use S3 storage")?;

        let region_provider =
            RegionProviderChain::first_try(Some(Region::new(config.aws_region.clone())))
                .or_default_provider()
                .or_else("us-east-1");
        let mut loader =
            aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region_provider);

        if let Some(endpoint) = config.aws_endpoint_url.as_deref() {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) = (
            config.aws_access_key_id.as_deref(),
            config.aws_secret_access_key.as_deref(),
        ) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "reviewdesk-config",
            ));
        }

        let shared = loader.load().await;
        let client = S3Client::from_conf(
            S3ConfigBuilder::from(&shared)
                .force_path_style(true)
                .build(),
        );
        tracing::info!(bucket = %bucket, region = %config.aws_region, "s3 storage configured");
        Ok(Self::new(client, bucket))
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        if let Some(content_disposition) = content_disposition {
            request = request.content_disposition(content_disposition);
        }

        request
            .send()
            .await
            .context("failed to upload object to S3")?;

        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presign_config = PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .context("failed to build S3 presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .context("failed to generate presigned download URL")?;

        Ok(presigned.uri().to_string())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to delete object from S3")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

/// Keeps uploads in process memory; used without an S3 bucket and in tests.
#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
            content_disposition,
        };
        self.objects.lock().await.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "object {key} missing");
        Ok(format!(
            "memory://objects/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects
            .lock()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| anyhow!("object {key} missing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_keep_safe_extensions() {
        let owner = Uuid::new_v4();
        let key = object_key(owner, "Budget Plan.PDF");
        assert!(key.starts_with(&format!("documents/{owner}/")));
        assert!(key.ends_with(".pdf"));

        let odd = object_key(owner, "notes.t x t");
        assert!(!odd.contains(' '));
        let bare = object_key(owner, "README");
        assert!(!bare.contains('.'));
    }

    #[tokio::test]
    async fn memory_storage_presigns_only_existing_objects() {
        let storage = MemoryObjectStorage::new();
        assert!(storage
            .presign_get_object("missing", Duration::from_secs(60))
            .await
            .is_err());

        storage
            .put_object("k", b"data".to_vec(), Some("text/plain".into()), None)
            .await
            .unwrap();
        let url = storage
            .presign_get_object("k", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(url, "memory://objects/k?expires_in=60");

        storage.delete_object("k").await.unwrap();
        assert_eq!(storage.object_count().await, 0);
    }
}
