//! Manifest types describing one migration artifact

use crate::checksum::{compute_aggregate_checksum, compute_file_digest, CHECKSUM_ALGORITHM};
use crate::error::{CoreError, CoreResult};
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Category of a migration file, which decides when (and whether) it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    /// Generated schema migration (e.g. drizzle output)
    #[serde(alias = "drizzle")]
    Schema,
    /// Hand-written migration script
    Custom,
    /// Seed data
    Seed,
    /// Reverses a version; only executed by rollback
    Rollback,
}

impl FileCategory {
    /// Classify a relative path by its first directory component
    pub fn from_path(path: &str) -> Self {
        let first = match path.split_once('/') {
            Some((dir, _)) => dir,
            None => return FileCategory::Schema,
        };
        match first {
            "custom" | "scripts" => FileCategory::Custom,
            "seed" | "seeds" => FileCategory::Seed,
            "rollback" | "rollbacks" | "down" => FileCategory::Rollback,
            _ => FileCategory::Schema,
        }
    }

    /// Position in the apply order; rollback files are never planned for apply
    pub fn apply_rank(&self) -> Option<u8> {
        match self {
            FileCategory::Schema => Some(0),
            FileCategory::Custom => Some(1),
            FileCategory::Seed => Some(2),
            FileCategory::Rollback => None,
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileCategory::Schema => write!(f, "schema"),
            FileCategory::Custom => write!(f, "custom"),
            FileCategory::Seed => write!(f, "seed"),
            FileCategory::Rollback => write!(f, "rollback"),
        }
    }
}

impl std::str::FromStr for FileCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "schema" | "drizzle" => Ok(FileCategory::Schema),
            "custom" => Ok(FileCategory::Custom),
            "seed" => Ok(FileCategory::Seed),
            "rollback" => Ok(FileCategory::Rollback),
            other => Err(format!("unknown file category '{}'", other)),
        }
    }
}

/// A migration file with its content, as produced by a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Relative path using `/` separators
    pub path: String,

    /// File category
    pub category: FileCategory,

    /// Raw file content
    pub content: Vec<u8>,
}

impl MigrationFile {
    pub fn new(
        path: impl Into<String>,
        content: impl Into<Vec<u8>>,
        category: FileCategory,
    ) -> Self {
        Self {
            path: path.into(),
            category,
            content: content.into(),
        }
    }

    /// Create a file whose category is derived from its path
    pub fn classified(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        let category = FileCategory::from_path(&path);
        Self::new(path, content, category)
    }

    /// Content as SQL text; units must be valid UTF-8
    pub fn sql(&self) -> CoreResult<&str> {
        std::str::from_utf8(&self.content).map_err(|e| CoreError::InvalidEncoding {
            path: self.path.clone(),
            offset: e.valid_up_to(),
        })
    }
}

/// One entry in a manifest's file list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Relative path, unique within the manifest
    pub path: String,

    /// Hex SHA-256 of the file content
    pub checksum: String,

    /// Content size in bytes
    pub size: u64,

    /// File category
    #[serde(rename = "type")]
    pub category: FileCategory,
}

/// Fingerprint of the machine that built an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
    pub runtime: String,
}

impl PlatformInfo {
    /// Describe the current machine
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            runtime: "rust".to_string(),
        }
    }
}

/// Supply-chain metadata describing how an artifact was built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Identity of the builder (user or CI job)
    pub builder: String,

    /// When the provenance record was generated
    pub built_at: DateTime<Utc>,

    /// Source control revision the migrations were built from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<String>,

    /// Aggregate checksum of the manifest this record describes
    pub manifest_checksum: String,

    /// Machine the build ran on
    pub platform: PlatformInfo,
}

/// Signature and provenance embedded in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    /// Signature scheme identifier (e.g. `ed25519`)
    pub algorithm: String,

    /// Encoded public key of the signer
    pub public_key: String,

    /// Encoded signature over [`Manifest::signing_payload`]
    pub signature: String,

    /// Optional provenance record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

/// Free-form metadata supplied when building a manifest
#[derive(Debug, Clone, Default)]
pub struct ManifestMetadata {
    pub previous_version: Option<Version>,
    pub notes: String,
    pub author: Option<String>,
    pub dependencies: Vec<Version>,
}

/// The manifest describing one immutable migration artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Version this artifact delivers
    pub version: Version,

    /// Predecessor this artifact was built against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<Version>,

    /// When the manifest was built
    pub created: DateTime<Utc>,

    /// Aggregate checksum over all files
    pub checksum: String,

    /// Hash algorithm used for every digest
    pub checksum_algorithm: String,

    /// Files in the artifact
    pub files: Vec<ManifestFile>,

    /// Release notes
    #[serde(default)]
    pub notes: String,

    /// Author of the migration set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Versions that must already be applied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Version>,

    /// Embedded signature and provenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureBlock>,

    /// Machine that built the artifact
    pub platform: PlatformInfo,
}

/// Assemble a manifest for `files`, computing every digest
pub fn build_manifest(
    version: Version,
    files: &[MigrationFile],
    metadata: ManifestMetadata,
) -> CoreResult<Manifest> {
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(files.len());

    for file in files {
        if !seen.insert(file.path.as_str()) {
            return Err(CoreError::DuplicatePath {
                path: file.path.clone(),
            });
        }
        entries.push(ManifestFile {
            path: file.path.clone(),
            checksum: compute_file_digest(&file.content),
            size: file.content.len() as u64,
            category: file.category,
        });
    }

    entries.sort_by(|a, b| a.path.as_bytes().cmp(b.path.as_bytes()));
    let checksum = aggregate_of(&entries);

    Ok(Manifest {
        version,
        previous_version: metadata.previous_version,
        created: Utc::now(),
        checksum,
        checksum_algorithm: CHECKSUM_ALGORITHM.to_string(),
        files: entries,
        notes: metadata.notes,
        author: metadata.author,
        dependencies: metadata.dependencies,
        signature: None,
        platform: PlatformInfo::current(),
    })
}

fn aggregate_of(files: &[ManifestFile]) -> String {
    compute_aggregate_checksum(files.iter().map(|f| (f.path.as_str(), f.checksum.as_str())))
}

impl Manifest {
    /// Recompute the aggregate checksum from the recorded file digests
    pub fn recompute_checksum(&self) -> String {
        aggregate_of(&self.files)
    }

    /// Check the recorded aggregate checksum against the recorded file digests
    pub fn verify_aggregate(&self) -> CoreResult<()> {
        let actual = self.recompute_checksum();
        if actual != self.checksum {
            return Err(CoreError::AggregateChecksumMismatch {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Look up a file entry by path
    pub fn file(&self, path: &str) -> Option<&ManifestFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Files of one category, in path order
    pub fn files_in(&self, category: FileCategory) -> Vec<&ManifestFile> {
        let mut files: Vec<&ManifestFile> =
            self.files.iter().filter(|f| f.category == category).collect();
        files.sort_by(|a, b| a.path.as_bytes().cmp(b.path.as_bytes()));
        files
    }

    /// Bytes covered by the manifest signature: the manifest with its
    /// signature block removed
    pub fn signing_payload(&self) -> CoreResult<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        Ok(serde_json::to_vec(&unsigned)?)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
#[path = "manifest_test.rs"]
mod tests;
