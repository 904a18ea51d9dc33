//! Artifact stores
//!
//! An artifact store holds the encoded archive and manifest of every
//! published version. Artifacts are immutable: a version can be pushed once
//! and only removed as a whole.

mod fs;
mod memory;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

use async_trait::async_trait;
use thiserror::Error;
use tm_core::{Manifest, Version};

/// Artifact store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// S001: No artifact for the version
    #[error("[S001] Artifact not found: {version}")]
    NotFound { version: String },

    /// S002: Version was already published
    #[error("[S002] Artifact already exists: {version}")]
    AlreadyExists { version: String },

    /// S003: Backing storage failure
    #[error("[S003] Artifact store IO error at '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// S004: Stored manifest could not be read back
    #[error("[S004] Stored manifest for {version} is unreadable: {message}")]
    Corrupt { version: String, message: String },
}

impl StoreError {
    /// Whether the version is simply absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type alias for StoreError
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for published artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Publish an artifact, returning where it was stored
    async fn push(
        &self,
        version: &Version,
        archive: Vec<u8>,
        manifest: &Manifest,
    ) -> StoreResult<String>;

    /// Retrieve the archive and stored manifest of a version
    async fn pull(&self, version: &Version) -> StoreResult<(Vec<u8>, Manifest)>;

    /// Every stored version, in no particular order
    async fn list(&self) -> StoreResult<Vec<Version>>;

    /// Whether the version is stored
    async fn exists(&self, version: &Version) -> StoreResult<bool>;

    /// Remove a version
    async fn delete(&self, version: &Version) -> StoreResult<()>;

    /// Store type identifier for logging
    fn store_type(&self) -> &'static str;
}
