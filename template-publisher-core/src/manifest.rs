//! The published catalog: `{ "templates": { type: { name: entry } } }`.
//!
//! The manifest is rebuilt from the discovered templates on every run; an existing file is
//! deleted first and never merged.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::asset_key::resolve_image_key;
use crate::catalog::Template;
use crate::config::StoreConfig;
use crate::report::{Phase, PhaseReport};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Groups that are always present in the manifest, even when empty.
pub const DEFAULT_TYPES: [&str; 3] = ["app", "screen", "component"];

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Manifest contribution of a single template. A fixed projection of its definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub key: String,
    pub category: String,
    pub description: String,
    pub url: String,
    pub icon: String,
    pub background: String,
    pub is_new: bool,
    pub image: String,
}

/// Derive the manifest entry for `template`. Pure: no I/O.
pub fn manifest_entry(template: &Template, store: &StoreConfig) -> ManifestEntry {
    let definition = &template.definition;
    let image_key = resolve_image_key(Some(&definition.name), definition.image.as_deref());
    ManifestEntry {
        kind: template.kind.clone(),
        name: template.name.clone(),
        key: template.key(),
        category: definition.category.clone(),
        description: definition.description.clone(),
        url: definition.url.clone(),
        icon: definition.icon.clone(),
        background: definition.background.clone(),
        is_new: definition.is_new.unwrap_or(false),
        image: store.image_url(&image_key),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub templates: BTreeMap<String, BTreeMap<String, ManifestEntry>>,
}

impl Default for Manifest {
    fn default() -> Self {
        let templates = DEFAULT_TYPES
            .iter()
            .map(|kind| (kind.to_string(), BTreeMap::new()))
            .collect();
        Self { templates }
    }
}

impl Manifest {
    pub fn from_templates(templates: &[Template], store: &StoreConfig) -> Self {
        let mut manifest = Self::default();
        for template in templates {
            let entry = manifest_entry(template, store);
            manifest
                .templates
                .entry(entry.kind.clone())
                .or_default()
                .insert(entry.name.clone(), entry);
        }
        manifest
    }

    pub fn len(&self) -> usize {
        self.templates.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, kind: &str, name: &str) -> Option<&ManifestEntry> {
        self.templates.get(kind)?.get(name)
    }

    /// Tab-indented JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        Ok(out)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = fs::read(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

pub fn manifest_path(dist_dir: &Path) -> PathBuf {
    dist_dir.join(MANIFEST_FILE)
}

/// Replace `{dist_dir}/manifest.json` with a manifest of `templates`.
///
/// The previous file is removed before writing, so on failure no manifest is left behind.
pub fn build_manifest(
    templates: &[Template],
    dist_dir: &Path,
    store: &StoreConfig,
) -> Result<PhaseReport, ManifestError> {
    let path = manifest_path(dist_dir);
    let write_err = |source| ManifestError::Write {
        path: path.clone(),
        source,
    };

    fs::create_dir_all(dist_dir).map_err(write_err)?;
    if path.exists() {
        fs::remove_file(&path).map_err(write_err)?;
    }

    info!(path = %path.display(), templates = templates.len(), "Writing manifest");
    let manifest = Manifest::from_templates(templates, store);
    let bytes = manifest.to_json()?;
    if let Err(source) = fs::write(&path, bytes) {
        error!(path = %path.display(), error = %source, "Failed to write manifest");
        // A half-written manifest must not be published.
        let _ = fs::remove_file(&path);
        return Err(write_err(source));
    }

    let mut report = PhaseReport::new(Phase::BuildManifest);
    report.succeeded = manifest
        .templates
        .values()
        .flat_map(|entries| entries.values().map(|entry| entry.key.clone()))
        .collect();
    Ok(report)
}
