//! Packs every template directory into `{dist}/templates/{type}/{name}.tar.gz`.
//!
//! Archives are rooted at the template name, so unpacking one inside the type directory
//! recreates `{name}/...`. The output tree is wiped before every run.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::Template;
use crate::report::{ItemFailure, Phase, PhaseReport};

pub const ARCHIVES_DIR: &str = "templates";
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";
const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot reset archive directory {path}: {source}")]
    Reset {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot package {template}: {source}")]
    Package {
        template: String,
        source: std::io::Error,
    },

    #[error("packaging task for {template} failed: {message}")]
    Task { template: String, message: String },
}

pub fn archives_dir(dist_dir: &Path) -> PathBuf {
    dist_dir.join(ARCHIVES_DIR)
}

pub fn archive_path(dist_dir: &Path, kind: &str, name: &str) -> PathBuf {
    archives_dir(dist_dir)
        .join(kind)
        .join(format!("{name}{ARCHIVE_EXTENSION}"))
}

/// Package all `templates`, at most `max_parallel` at a time.
///
/// One template failing is recorded in the report; only failing to reset the output tree
/// aborts the phase.
pub async fn pack_all(
    templates: &[Template],
    dist_dir: &Path,
    max_parallel: usize,
) -> Result<PhaseReport, ArchiveError> {
    let out_dir = archives_dir(dist_dir);
    reset_dir(&out_dir).map_err(|source| ArchiveError::Reset {
        path: out_dir.clone(),
        source,
    })?;
    info!(
        out_dir = %out_dir.display(),
        templates = templates.len(),
        "Packaging template archives"
    );

    let jobs = templates.iter().cloned().map(|template| {
        let dist_dir = dist_dir.to_path_buf();
        async move {
            let key = template.key();
            let task_key = key.clone();
            let result = tokio::task::spawn_blocking(move || pack_template(&template, &dist_dir))
                .await
                .unwrap_or_else(|e| {
                    Err(ArchiveError::Task {
                        template: task_key,
                        message: e.to_string(),
                    })
                });
            (key, result)
        }
    });
    let results: Vec<(String, Result<PathBuf, ArchiveError>)> = stream::iter(jobs)
        .buffer_unordered(max_parallel.max(1))
        .collect()
        .await;

    let mut report = PhaseReport::new(Phase::BuildArchives);
    for (key, result) in results {
        match result {
            Ok(path) => {
                debug!(template = %key, path = %path.display(), "Archive written");
                report.succeeded.push(key);
            }
            Err(e) => {
                warn!(template = %key, error = %e, "Skipping archive");
                report.failed.push(ItemFailure::new(key, e));
            }
        }
    }
    info!(
        written = report.succeeded.len(),
        failed = report.failed.len(),
        "Archive packaging finished"
    );
    Ok(report)
}

/// Write one archive. The file only appears under its final name once complete.
pub fn pack_template(template: &Template, dist_dir: &Path) -> Result<PathBuf, ArchiveError> {
    let package_err = |source| ArchiveError::Package {
        template: template.key(),
        source,
    };

    let final_path = archive_path(dist_dir, &template.kind, &template.name);
    let type_dir = final_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| archives_dir(dist_dir));
    fs::create_dir_all(&type_dir).map_err(package_err)?;

    let mut partial = final_path.clone().into_os_string();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    let written = write_archive(&template.location, &template.name, &partial)
        .and_then(|()| fs::rename(&partial, &final_path));
    if let Err(source) = written {
        let _ = fs::remove_file(&partial);
        return Err(package_err(source));
    }
    Ok(final_path)
}

fn write_archive(source_dir: &Path, root_name: &str, dest: &Path) -> std::io::Result<()> {
    if !source_dir.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("template directory {} is missing", source_dir.display()),
        ));
    }
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);
    // Links are stored as links; following them would also loop on `up -> ..`.
    builder.follow_symlinks(false);
    builder.append_dir_all(root_name, source_dir)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?.sync_all()
}

fn reset_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)
}
