//! Asset key resolution for template preview images.
//!
//! A key identifies a template's image in the store. Explicit keys from the definition are used
//! as-is; otherwise the key is derived from the template's display name.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::StoreConfig;

pub const FALLBACK_KEY: &str = "no-key";
pub const IMAGE_EXTENSION: &str = ".png";
pub const IMAGE_PREFIX: &str = "images";

static SEPARATOR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[/\s]+").expect("separator pattern is valid"));

/// Derive the image key for a template.
///
/// `explicit` wins unmodified. A missing or empty `name` yields [`FALLBACK_KEY`]. Otherwise the
/// name is lowercased, trimmed, and every run of slashes/whitespace becomes a single dash.
pub fn resolve_image_key(name: Option<&str>, explicit: Option<&str>) -> String {
    if let Some(key) = explicit {
        return key.to_string();
    }
    match name {
        Some(name) if !name.is_empty() => {
            let lowered = name.to_lowercase();
            SEPARATOR_RUN.replace_all(lowered.trim(), "-").into_owned()
        }
        _ => FALLBACK_KEY.to_string(),
    }
}

/// Stored filename for a key. Keys that already carry the extension are left alone.
pub fn image_filename(key: &str) -> String {
    if key.ends_with(IMAGE_EXTENSION) {
        key.to_string()
    } else {
        format!("{key}{IMAGE_EXTENSION}")
    }
}

/// Public URL the image for `key` is served from.
pub fn image_url(store: &StoreConfig, key: &str) -> String {
    format!(
        "{}/{}/{}",
        store.public_base_url(),
        IMAGE_PREFIX,
        image_filename(key)
    )
}
