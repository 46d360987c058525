/// `load_config` module: loads the static YAML config and the store credentials from the
/// environment into the core [`PipelineConfig`].
///
/// This is the only place where user-supplied configuration is parsed. Every failure here is a
/// configuration error and stops the process before any phase runs.
///
/// # Environment
/// - `TEMPLATE_BUCKET` / `TEMPLATE_REGION` override `store.bucket` / `store.region`
/// - `S3_ACCESS_KEY_ID`, `S3_SECRET_ACCESS_KEY` and optional `S3_ENDPOINT_URL` are read by
///   [`load_credentials`], only for commands that publish
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use template_publisher_core::config::{ConfigError, PipelineConfig, PublishOptions, StoreConfig};
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub publish: PublishSection,
    #[serde(default)]
    pub archive: ArchiveSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreSection {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PublishSection {
    pub max_concurrent_uploads: Option<usize>,
    pub max_attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArchiveSection {
    pub max_parallel: Option<usize>,
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_dist_dir() -> PathBuf {
    PathBuf::from("dist")
}

/// Credentials for the S3 client.
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub endpoint_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

/// Loads the YAML config at `path`, applies env overrides and validates the result.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: FileConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let config = into_pipeline_config(raw)?;
    config.trace_loaded();
    Ok(config)
}

fn into_pipeline_config(raw: FileConfig) -> Result<PipelineConfig, ConfigError> {
    let bucket = env_override("TEMPLATE_BUCKET", raw.store.bucket)
        .ok_or(ConfigError::Missing("store.bucket"))?;
    let region = env_override("TEMPLATE_REGION", raw.store.region)
        .ok_or(ConfigError::Missing("store.region"))?;

    let mut store = StoreConfig::new(bucket, region);
    if let Some(domain) = raw.store.domain {
        store.domain = domain;
    }

    let mut config = PipelineConfig::new(raw.templates_dir, raw.dist_dir, store);
    let defaults = PublishOptions::default();
    config.publish = PublishOptions {
        max_concurrent_uploads: raw
            .publish
            .max_concurrent_uploads
            .unwrap_or(defaults.max_concurrent_uploads),
        max_attempts: raw.publish.max_attempts.unwrap_or(defaults.max_attempts),
        backoff: raw
            .publish
            .backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.backoff),
    };
    if let Some(max_parallel) = raw.archive.max_parallel {
        config.max_parallel_archives = max_parallel;
    }

    config.validate()?;
    Ok(config)
}

fn env_override(var: &str, fallback: Option<String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or(fallback)
        .filter(|v| !v.trim().is_empty())
}

/// Reads store credentials from the environment. Missing credentials are fatal.
pub fn load_credentials(store: &StoreConfig) -> Result<Credentials> {
    let access_key = required_env("S3_ACCESS_KEY_ID")?;
    let secret_key = required_env("S3_SECRET_ACCESS_KEY")?;
    let endpoint_url = std::env::var("S3_ENDPOINT_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| format!("https://s3.{}.{}", store.region, store.domain));
    info!(endpoint_url = %endpoint_url, "S3 credentials found in env");
    Ok(Credentials {
        access_key,
        secret_key,
        endpoint_url,
    })
}

fn required_env(var: &'static str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(var))
        .with_context(|| format!("{var} environment variable not set"))
}
