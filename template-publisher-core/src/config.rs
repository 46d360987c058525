use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_STORE_DOMAIN: &str = "amazonaws.com";

/// Configuration problems are fatal: nothing useful can run without a valid config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration value: {0}")]
    Missing(&'static str),

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Bucket coordinates shared by manifest building (public URLs) and the store client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub bucket: String,
    pub region: String,
    #[serde(default = "default_domain")]
    pub domain: String,
}

fn default_domain() -> String {
    DEFAULT_STORE_DOMAIN.to_string()
}

impl StoreConfig {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            domain: default_domain(),
        }
    }

    /// Public base URL of the bucket, without a trailing slash.
    pub fn public_base_url(&self) -> String {
        format!("https://{}.s3.{}.{}", self.bucket, self.region, self.domain)
    }

    /// Public URL of the preview image stored under `key`.
    pub fn image_url(&self, key: &str) -> String {
        crate::asset_key::image_url(self, key)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::Missing("store.bucket"));
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::Missing("store.region"));
        }
        if self.domain.trim().is_empty() {
            return Err(ConfigError::Missing("store.domain"));
        }
        Ok(())
    }
}

/// Tuning for the publish phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    pub max_concurrent_uploads: usize,
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for every further attempt.
    pub backoff: Duration,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: 4,
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Everything one pipeline run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub templates_dir: PathBuf,
    pub dist_dir: PathBuf,
    pub store: StoreConfig,
    pub publish: PublishOptions,
    pub max_parallel_archives: usize,
}

impl PipelineConfig {
    pub fn new(templates_dir: PathBuf, dist_dir: PathBuf, store: StoreConfig) -> Self {
        Self {
            templates_dir,
            dist_dir,
            store,
            publish: PublishOptions::default(),
            max_parallel_archives: 4,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        if self.publish.max_concurrent_uploads == 0 {
            return Err(ConfigError::Invalid {
                field: "publish.max_concurrent_uploads",
                reason: "must be at least 1".into(),
            });
        }
        if self.publish.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "publish.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_parallel_archives == 0 {
            return Err(ConfigError::Invalid {
                field: "archive.max_parallel",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            templates_dir = %self.templates_dir.display(),
            dist_dir = %self.dist_dir.display(),
            bucket = %self.store.bucket,
            region = %self.store.region,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}
