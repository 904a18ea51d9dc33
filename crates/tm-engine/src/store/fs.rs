//! Filesystem artifact store
//!
//! Layout: `<root>/<version>/artifact.tmk` and `<root>/<version>/manifest.json`.
//! A version directory is staged under a hidden temporary name and renamed
//! into place, so readers never observe a half-written artifact.

use super::{ArtifactStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tm_core::{Manifest, Version};

/// Archive file name inside a version directory
pub const ARCHIVE_FILE: &str = "artifact.tmk";

/// Manifest file name inside a version directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Artifact store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, version: &Version) -> PathBuf {
        self.root.join(version.to_string())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn push(
        &self,
        version: &Version,
        archive: Vec<u8>,
        manifest: &Manifest,
    ) -> StoreResult<String> {
        let target = self.version_dir(version);
        if tokio::fs::try_exists(&target).await.map_err(|e| io_error(&target, e))? {
            return Err(StoreError::AlreadyExists {
                version: version.to_string(),
            });
        }

        let manifest_json = manifest.to_json().map_err(|e| StoreError::Corrupt {
            version: version.to_string(),
            message: e.to_string(),
        })?;

        let staging = self.root.join(format!(".staging-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| io_error(&staging, e))?;

        let staged = async {
            let archive_path = staging.join(ARCHIVE_FILE);
            tokio::fs::write(&archive_path, &archive)
                .await
                .map_err(|e| io_error(&archive_path, e))?;
            let manifest_path = staging.join(MANIFEST_FILE);
            tokio::fs::write(&manifest_path, manifest_json.as_bytes())
                .await
                .map_err(|e| io_error(&manifest_path, e))?;
            tokio::fs::rename(&staging, &target)
                .await
                .map_err(|e| io_error(&target, e))
        }
        .await;

        if let Err(e) = staged {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&staging).await {
                log::warn!("Failed to remove staging dir {}: {}", staging.display(), cleanup);
            }
            return Err(e);
        }

        log::debug!("Stored artifact {} at {}", version, target.display());
        Ok(target.display().to_string())
    }

    async fn pull(&self, version: &Version) -> StoreResult<(Vec<u8>, Manifest)> {
        let dir = self.version_dir(version);
        if !tokio::fs::try_exists(&dir).await.map_err(|e| io_error(&dir, e))? {
            return Err(StoreError::NotFound {
                version: version.to_string(),
            });
        }

        let archive_path = dir.join(ARCHIVE_FILE);
        let archive = tokio::fs::read(&archive_path)
            .await
            .map_err(|e| io_error(&archive_path, e))?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let json = tokio::fs::read_to_string(&manifest_path)
            .await
            .map_err(|e| io_error(&manifest_path, e))?;
        let manifest = Manifest::from_json(&json).map_err(|e| StoreError::Corrupt {
            version: version.to_string(),
            message: e.to_string(),
        })?;

        Ok((archive, manifest))
    }

    async fn list(&self) -> StoreResult<Vec<Version>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root, e)),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            // Staging directories and stray files are not versions
            if let Ok(version) = Version::parse(name) {
                if entry.path().join(MANIFEST_FILE).is_file() {
                    versions.push(version);
                }
            }
        }
        Ok(versions)
    }

    async fn exists(&self, version: &Version) -> StoreResult<bool> {
        let manifest_path = self.version_dir(version).join(MANIFEST_FILE);
        tokio::fs::try_exists(&manifest_path)
            .await
            .map_err(|e| io_error(&manifest_path, e))
    }

    async fn delete(&self, version: &Version) -> StoreResult<()> {
        let dir = self.version_dir(version);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                version: version.to_string(),
            }),
            Err(e) => Err(io_error(&dir, e)),
        }
    }

    fn store_type(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
#[path = "fs_test.rs"]
mod tests;
