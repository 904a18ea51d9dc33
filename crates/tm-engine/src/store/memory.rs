//! In-process artifact store

use super::{ArtifactStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tm_core::{Manifest, Version};

/// Artifact store held in memory
#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<BTreeMap<String, (Vec<u8>, Manifest)>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored archive bytes of an existing version
    ///
    /// Bypasses immutability so tests can simulate tampering at rest.
    pub fn overwrite_archive(&self, version: &Version, archive: Vec<u8>) -> StoreResult<()> {
        let mut artifacts = self.artifacts.lock().unwrap_or_else(|p| p.into_inner());
        match artifacts.get_mut(&version.to_string()) {
            Some(entry) => {
                entry.0 = archive;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                version: version.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn push(
        &self,
        version: &Version,
        archive: Vec<u8>,
        manifest: &Manifest,
    ) -> StoreResult<String> {
        let key = version.to_string();
        let mut artifacts = self.artifacts.lock().unwrap_or_else(|p| p.into_inner());
        if artifacts.contains_key(&key) {
            return Err(StoreError::AlreadyExists { version: key });
        }
        artifacts.insert(key.clone(), (archive, manifest.clone()));
        Ok(format!("memory://{}", key))
    }

    async fn pull(&self, version: &Version) -> StoreResult<(Vec<u8>, Manifest)> {
        let artifacts = self.artifacts.lock().unwrap_or_else(|p| p.into_inner());
        artifacts
            .get(&version.to_string())
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                version: version.to_string(),
            })
    }

    async fn list(&self) -> StoreResult<Vec<Version>> {
        let artifacts = self.artifacts.lock().unwrap_or_else(|p| p.into_inner());
        Ok(artifacts.values().map(|(_, m)| m.version.clone()).collect())
    }

    async fn exists(&self, version: &Version) -> StoreResult<bool> {
        let artifacts = self.artifacts.lock().unwrap_or_else(|p| p.into_inner());
        Ok(artifacts.contains_key(&version.to_string()))
    }

    async fn delete(&self, version: &Version) -> StoreResult<()> {
        let mut artifacts = self.artifacts.lock().unwrap_or_else(|p| p.into_inner());
        match artifacts.remove(&version.to_string()) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                version: version.to_string(),
            }),
        }
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
