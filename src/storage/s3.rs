//! S3-backed catalog and signer.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use tracing::debug;

use super::{ObjectCatalog, StorageError, UrlSigner};

/// Catalog and signer over one S3 bucket.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    sign_ttl: Duration,
}

impl S3ObjectStore {
    /// Create a store from the ambient AWS environment (region, profile,
    /// credentials).
    pub async fn from_env(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        sign_ttl: Duration,
    ) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket, prefix, sign_ttl)
    }

    /// Create a store around an existing client.
    pub fn new(
        client: aws_sdk_s3::Client,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        sign_ttl: Duration,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            sign_ttl,
        }
    }

    /// Keys that represent content rather than a grouping marker.
    fn is_content_key(key: &str, size: i64) -> bool {
        !key.is_empty() && !key.ends_with('/') && size > 0
    }
}

#[async_trait]
impl ObjectCatalog for S3ObjectStore {
    async fn list_objects(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&self.prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StorageError::List(e.to_string()))?;
            for object in page.contents() {
                let key = object.key().unwrap_or_default();
                let size = object.size().unwrap_or_default();
                if Self::is_content_key(key, size) {
                    keys.push(key.to_string());
                }
            }
        }

        debug!(
            "listed {} objects under {}/{}",
            keys.len(),
            self.bucket,
            self.prefix
        );
        Ok(keys)
    }
}

#[async_trait]
impl UrlSigner for S3ObjectStore {
    async fn sign(&self, identifier: &str) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(self.sign_ttl)
            .map_err(|e| StorageError::Sign(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(identifier)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Sign(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}
