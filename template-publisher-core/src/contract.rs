#![allow(unused)]

//! # contract: interface to the remote object store
//!
//! The publish phase only ever talks to storage through [`ObjectStore`]. The CLI crate
//! provides the S3 implementation; tests use the generated `MockObjectStore`.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; the mock is exported behind the default
//!   `test-export-mocks` feature so integration tests in other crates can use it.

use std::path::Path;

use async_trait::async_trait;
use mockall::{automock, predicate::*};
use thiserror::Error;

/// Errors raised by an object store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("bucket operation failed: {0}")]
    Bucket(String),

    #[error("upload of '{key}' failed: {message}")]
    Upload { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of one successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub key: String,
    pub bytes: u64,
}

/// Remote bucket the catalog is published to.
///
/// All methods are idempotent except `upload`, which overwrites the remote key.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Establish a session; fails with [`StoreError::Auth`] on invalid credentials.
    async fn init(&self) -> Result<(), StoreError>;

    /// Create the configured bucket if it does not exist yet.
    async fn ensure_bucket_exists(&self) -> Result<(), StoreError>;

    /// Apply the public-read policy needed to serve images and archives.
    async fn configure_bucket_policy(&self) -> Result<(), StoreError>;

    /// Upload a local file under `remote_key`.
    async fn upload(&self, local_path: &Path, remote_key: &str)
        -> Result<UploadOutcome, StoreError>;
}
