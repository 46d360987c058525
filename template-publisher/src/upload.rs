#![doc = "Object store integration for the CLI: implements the core `ObjectStore` trait against S3 or any S3-compatible service."]
//
//! # S3 client
//!
//! [`S3Client`] is the production [`ObjectStore`]. It is built from the pipeline's
//! [`StoreConfig`] and the credentials loaded by [`crate::load_config::load_credentials`].
//! Retries and concurrency are handled by the publish phase in core; this client performs
//! exactly one request per call.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use minio::s3::{
    client::Client, creds::StaticProvider, http::BaseUrl, segmented_bytes::SegmentedBytes,
    types::S3Api,
};
use template_publisher_core::config::StoreConfig;
use template_publisher_core::contract::{ObjectStore, StoreError, UploadOutcome};

use crate::load_config::Credentials;

pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    pub fn new(store: &StoreConfig, credentials: &Credentials) -> Result<Self, StoreError> {
        let base_url = BaseUrl::from_str(&credentials.endpoint_url).map_err(|e| {
            StoreError::Auth(format!(
                "invalid endpoint URL '{}': {e}",
                credentials.endpoint_url
            ))
        })?;
        let provider = StaticProvider::new(&credentials.access_key, &credentials.secret_key, None);
        let client = Client::new(base_url, Some(Box::new(provider)), None, None)
            .map_err(|e| StoreError::Auth(format!("failed to create S3 client: {e}")))?;
        tracing::info!(
            bucket = %store.bucket,
            endpoint_url = %credentials.endpoint_url,
            "Initialized S3Client"
        );
        Ok(Self {
            client,
            bucket: store.bucket.clone(),
        })
    }

    /// Anonymous read access to every object in the bucket.
    pub fn public_read_policy(bucket: &str) -> String {
        format!(
            r#"{{"Version":"2012-10-17","Statement":[{{"Effect":"Allow","Principal":{{"AWS":["*"]}},"Action":["s3:GetObject"],"Resource":["arn:aws:s3:::{bucket}/*"]}}]}}"#
        )
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn init(&self) -> Result<(), StoreError> {
        // bucket_exists doubles as the credential check.
        match self.client.bucket_exists(&self.bucket).send().await {
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, "S3 session established");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, bucket = %self.bucket, "S3 authentication failed");
                Err(StoreError::Auth(e.to_string()))
            }
        }
    }

    async fn ensure_bucket_exists(&self) -> Result<(), StoreError> {
        match self.client.bucket_exists(&self.bucket).send().await {
            Ok(response) if response.exists => {
                tracing::debug!(bucket = %self.bucket, "Bucket already exists");
                Ok(())
            }
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, "Creating bucket");
                self.client
                    .create_bucket(&self.bucket)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| {
                        StoreError::Bucket(format!(
                            "failed to create bucket '{}': {e}",
                            self.bucket
                        ))
                    })
            }
            Err(e) => Err(StoreError::Bucket(format!(
                "failed to check bucket '{}': {e}",
                self.bucket
            ))),
        }
    }

    async fn configure_bucket_policy(&self) -> Result<(), StoreError> {
        let policy = Self::public_read_policy(&self.bucket);
        self.client
            .put_bucket_policy(&self.bucket)
            .config(policy)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, "Failed to set bucket policy");
                StoreError::Bucket(format!(
                    "failed to set policy on bucket '{}': {e}",
                    self.bucket
                ))
            })?;
        tracing::info!(bucket = %self.bucket, "Public-read bucket policy applied");
        Ok(())
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote_key: &str,
    ) -> Result<UploadOutcome, StoreError> {
        let data = tokio::fs::read(local_path).await?;
        let size = data.len() as u64;
        tracing::info!(
            key = remote_key,
            path = %local_path.display(),
            bytes = size,
            "Uploading object"
        );
        let body = SegmentedBytes::from(Bytes::from(data));
        self.client
            .put_object(&self.bucket, remote_key, body)
            .send()
            .await
            .map_err(|e| StoreError::Upload {
                key: remote_key.to_string(),
                message: e.to_string(),
            })?;
        Ok(UploadOutcome {
            key: remote_key.to_string(),
            bytes: size,
        })
    }
}
