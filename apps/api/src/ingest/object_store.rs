use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("unsupported object url: {0}")]
    InvalidUrl(String),

    #[error("object store error: {0}")]
    Backend(String),
}

/// Binary object storage where uploaded resume files live.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, ObjectStoreError>;

    /// Best effort. Deleting an object that is already gone succeeds.
    async fn delete_object(&self, url: &str) -> Result<(), ObjectStoreError>;
}

/// Splits `s3://bucket/key/with/slashes` into bucket and key.
pub fn parse_s3_url(url: &str) -> Result<(&str, &str), ObjectStoreError> {
    let rest = url
        .strip_prefix("s3://")
        .ok_or_else(|| ObjectStoreError::InvalidUrl(url.to_string()))?;
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => Err(ObjectStoreError::InvalidUrl(url.to_string())),
    }
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, ObjectStoreError> {
        let (bucket, key) = parse_s3_url(url)?;

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    ObjectStoreError::NotFound(url.to_string())
                } else {
                    ObjectStoreError::Backend(format!("S3 get_object failed: {service}"))
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("S3 body read failed: {e}")))?;

        Ok(body.into_bytes())
    }

    async fn delete_object(&self, url: &str) -> Result<(), ObjectStoreError> {
        let (bucket, key) = parse_s3_url(url)?;

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("S3 delete_object failed: {e}")))?;

        info!("Deleted s3://{bucket}/{key}");
        Ok(())
    }
}
