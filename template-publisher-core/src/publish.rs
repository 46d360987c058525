//! Publishes the staged manifest and archives to the object store.
//!
//! Everything is read back from disk, so the store receives whatever the earlier phases
//! actually produced. Bucket setup happens before any upload; after that every artifact is
//! uploaded independently (bounded concurrency, retry with backoff) and a failed upload
//! never cancels its siblings.

use std::fs;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::archive::{archives_dir, ARCHIVES_DIR, ARCHIVE_EXTENSION};
use crate::config::PublishOptions;
use crate::contract::{ObjectStore, StoreError, UploadOutcome};
use crate::manifest::{manifest_path, MANIFEST_FILE};
use crate::report::{ItemFailure, Phase, PhaseReport};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("store setup failed during {step}: {source}")]
    Setup {
        step: &'static str,
        source: StoreError,
    },
}

/// A local file and the key it is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub local_path: PathBuf,
    pub remote_key: String,
}

/// What the on-disk walk found: artifacts to upload plus the parts of the staging tree that
/// could not be read.
#[derive(Debug, Default)]
pub struct StagedArtifacts {
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<ItemFailure>,
}

/// Collect the artifacts staged in `dist_dir`: the manifest (if present) first, then every
/// `templates/{type}/*.tar.gz`.
///
/// An unreadable type directory or entry is recorded and skipped; the rest is still staged.
pub fn staged_artifacts(dist_dir: &Path) -> StagedArtifacts {
    let mut staged = StagedArtifacts::default();

    let manifest = manifest_path(dist_dir);
    if manifest.is_file() {
        staged.artifacts.push(Artifact {
            local_path: manifest,
            remote_key: MANIFEST_FILE.to_string(),
        });
    } else {
        warn!(path = %manifest.display(), "No manifest staged; publishing archives only");
    }

    let root = archives_dir(dist_dir);
    if !root.is_dir() {
        warn!(path = %root.display(), "No archives staged");
        return staged;
    }
    let type_entries = match fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %root.display(), error = %e, "Cannot read staged archives");
            staged.failures.push(ItemFailure::new(ARCHIVES_DIR, e));
            return staged;
        }
    };

    for type_entry in type_entries {
        let type_entry = match type_entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %root.display(), error = %e, "Skipping unreadable staging entry");
                staged.failures.push(ItemFailure::new(ARCHIVES_DIR, e));
                continue;
            }
        };
        let type_path = type_entry.path();
        if !type_path.is_dir() {
            continue;
        }
        let kind = type_entry.file_name().to_string_lossy().into_owned();
        let item = format!("{ARCHIVES_DIR}/{kind}");
        match type_archives(&type_path, &kind) {
            Ok(artifacts) => staged.artifacts.extend(artifacts),
            Err(e) => {
                warn!(path = %type_path.display(), error = %e, "Skipping unreadable archive directory");
                staged.failures.push(ItemFailure::new(item, e));
            }
        }
    }
    staged
}

fn type_archives(type_path: &Path, kind: &str) -> std::io::Result<Vec<Artifact>> {
    let mut artifacts = Vec::new();
    for file in fs::read_dir(type_path)? {
        let file = file?;
        let Some(file_name) = file.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !file_name.ends_with(ARCHIVE_EXTENSION) || !file.path().is_file() {
            debug!(path = %file.path().display(), "Ignoring non-archive file");
            continue;
        }
        artifacts.push(Artifact {
            local_path: file.path(),
            remote_key: format!("{ARCHIVES_DIR}/{kind}/{file_name}"),
        });
    }
    Ok(artifacts)
}

/// Publish everything staged in `dist_dir` to `store`.
pub async fn publish<S>(
    store: &S,
    dist_dir: &Path,
    options: &PublishOptions,
) -> Result<PhaseReport, PublishError>
where
    S: ObjectStore + ?Sized,
{
    info!(dist_dir = %dist_dir.display(), "Publishing staged artifacts");

    store
        .init()
        .await
        .map_err(|source| PublishError::Setup { step: "init", source })?;
    store
        .ensure_bucket_exists()
        .await
        .map_err(|source| PublishError::Setup {
            step: "ensure_bucket_exists",
            source,
        })?;
    store
        .configure_bucket_policy()
        .await
        .map_err(|source| PublishError::Setup {
            step: "configure_bucket_policy",
            source,
        })?;
    info!("Bucket ready");

    let StagedArtifacts {
        artifacts,
        failures: staging_failures,
    } = staged_artifacts(dist_dir);
    info!(
        artifacts = artifacts.len(),
        max_concurrent = options.max_concurrent_uploads,
        "Uploading artifacts"
    );

    let results: Vec<(String, Result<UploadOutcome, StoreError>)> = stream::iter(artifacts)
        .map(|artifact| async move {
            let result = upload_with_retry(store, &artifact, options).await;
            (artifact.remote_key, result)
        })
        .buffer_unordered(options.max_concurrent_uploads.max(1))
        .collect()
        .await;

    let mut report = PhaseReport::new(Phase::Publish);
    report.failed.extend(staging_failures);
    for (key, result) in results {
        match result {
            Ok(outcome) => {
                debug!(key = %outcome.key, bytes = outcome.bytes, "Uploaded");
                report.succeeded.push(key);
            }
            Err(e) => {
                error!(key = %key, error = %e, "Upload failed");
                report.failed.push(ItemFailure::new(key, e));
            }
        }
    }
    info!(
        uploaded = report.succeeded.len(),
        failed = report.failed.len(),
        "Publish finished"
    );
    Ok(report)
}

/// Upload one artifact, retrying up to `options.max_attempts` times with doubling backoff.
pub async fn upload_with_retry<S>(
    store: &S,
    artifact: &Artifact,
    options: &PublishOptions,
) -> Result<UploadOutcome, StoreError>
where
    S: ObjectStore + ?Sized,
{
    let attempts = options.max_attempts.max(1);
    let mut delay = options.backoff;
    let mut attempt = 1;
    loop {
        match store
            .upload(&artifact.local_path, &artifact.remote_key)
            .await
        {
            Ok(outcome) => return Ok(outcome),
            Err(e) if attempt < attempts => {
                warn!(
                    key = %artifact.remote_key,
                    attempt,
                    error = %e,
                    "Upload attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
