//! Template discovery: scans `{root}/{type}/{name}/definition.json`.
//!
//! A broken candidate never stops discovery; it is logged, recorded in [`Catalog::failures`]
//! and skipped. Only an unreadable root aborts the scan.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::report::{ItemFailure, Phase, PhaseReport};

pub const DEFINITION_FILE: &str = "definition.json";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cannot read template root {path}: {source}")]
    Root {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed definition {path}: {source}")]
    Definition {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Metadata parsed from a template's definition file. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawDefinition")]
pub struct TemplateDefinition {
    pub category: String,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub icon: String,
    pub background: String,
    pub url: String,
    /// `new` from the file, falling back to the older `isNew` key.
    pub is_new: Option<bool>,
}

#[derive(Deserialize)]
struct RawDefinition {
    category: String,
    name: String,
    description: String,
    #[serde(default)]
    image: Option<String>,
    icon: String,
    background: String,
    url: String,
    #[serde(default)]
    new: Option<bool>,
    #[serde(default, rename = "isNew")]
    is_new: Option<bool>,
}

impl From<RawDefinition> for TemplateDefinition {
    fn from(raw: RawDefinition) -> Self {
        Self {
            category: raw.category,
            name: raw.name,
            description: raw.description,
            image: raw.image,
            icon: raw.icon,
            background: raw.background,
            url: raw.url,
            is_new: raw.new.or(raw.is_new),
        }
    }
}

impl TemplateDefinition {
    pub fn load(path: &Path) -> Result<Self, DiscoveryError> {
        let raw = fs::read_to_string(path).map_err(|source| DiscoveryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| DiscoveryError::Definition {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// One discovered template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Grouping directory, e.g. `app`, `screen` or `component`.
    pub kind: String,
    /// Directory name; may differ from `definition.name`.
    pub name: String,
    pub location: PathBuf,
    pub definition: TemplateDefinition,
}

impl Template {
    /// Load the template stored at `{type_dir}/{name}`.
    pub fn load(type_dir: &Path, kind: &str, name: &str) -> Result<Self, DiscoveryError> {
        let location = type_dir.join(name);
        let definition = TemplateDefinition::load(&location.join(DEFINITION_FILE))?;
        Ok(Self {
            kind: kind.to_string(),
            name: name.to_string(),
            location,
            definition,
        })
    }

    /// `type/name`, the template's key in the manifest and the store.
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} - {} [{}]: {}",
            self.key(),
            self.definition.name,
            self.definition.category,
            self.definition.description
        );
        if self.definition.is_new.unwrap_or(false) {
            line.push_str(" (new)");
        }
        line
    }
}

/// Result of a discovery scan.
#[derive(Debug, Default)]
pub struct Catalog {
    pub templates: Vec<Template>,
    pub failures: Vec<ItemFailure>,
}

impl Catalog {
    pub fn report(&self) -> PhaseReport {
        let mut report = PhaseReport::new(Phase::Discover);
        report.succeeded = self.templates.iter().map(Template::key).collect();
        report.failed = self.failures.clone();
        report
    }
}

/// Scan `root` for templates. Listing order is whatever the filesystem returns.
pub fn discover(root: &Path) -> Result<Catalog, DiscoveryError> {
    info!(root = %root.display(), "Discovering templates");
    let mut catalog = Catalog::default();

    let types = subdirectories(root, None, &mut catalog.failures).map_err(|source| {
        DiscoveryError::Root {
            path: root.to_path_buf(),
            source,
        }
    })?;
    for (kind, type_dir) in types {
        let candidates = match subdirectories(&type_dir, Some(&kind), &mut catalog.failures) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Skipping unreadable template type directory");
                catalog.failures.push(ItemFailure::new(kind.clone(), e));
                continue;
            }
        };

        for (name, _) in candidates {
            match Template::load(&type_dir, &kind, &name) {
                Ok(template) => {
                    debug!(template = %template.key(), "Discovered template");
                    catalog.templates.push(template);
                }
                Err(e) => {
                    warn!(kind = %kind, template = %name, error = %e, "Skipping template");
                    catalog
                        .failures
                        .push(ItemFailure::new(format!("{kind}/{name}"), e));
                }
            }
        }
    }

    info!(
        found = catalog.templates.len(),
        skipped = catalog.failures.len(),
        "Template discovery finished"
    );
    Ok(catalog)
}

/// Immediate subdirectories of `dir` as `(name, path)`; plain files are ignored.
///
/// Only an unreadable `dir` is an error. Entries that cannot be inspected, or whose names are
/// not UTF-8, are pushed to `failures` as `{parent}/{name}` and skipped.
fn subdirectories(
    dir: &Path,
    parent: Option<&str>,
    failures: &mut Vec<ItemFailure>,
) -> std::io::Result<Vec<(String, PathBuf)>> {
    let item = |name: &str| match parent {
        Some(parent) => format!("{parent}/{name}"),
        None => name.to_string(),
    };

    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Skipping unreadable directory entry");
                failures.push(ItemFailure::new(item("?"), e));
                continue;
            }
        };
        let lossy_name = entry.file_name().to_string_lossy().into_owned();
        match entry.file_type() {
            Ok(file_type) if file_type.is_dir() => {}
            Ok(_) => {
                debug!(path = %entry.path().display(), "Ignoring non-directory entry");
                continue;
            }
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping uninspectable entry");
                failures.push(ItemFailure::new(item(&lossy_name), e));
                continue;
            }
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!(path = %entry.path().display(), "Skipping directory with non UTF-8 name");
            failures.push(ItemFailure::new(item(&lossy_name), "directory name is not valid UTF-8"));
            continue;
        };
        dirs.push((name, entry.path()));
    }
    Ok(dirs)
}
