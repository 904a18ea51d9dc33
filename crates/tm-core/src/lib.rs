//! tm-core - Core library for Tidemark
//!
//! This crate provides the types shared by every Tidemark component:
//! migration versions, checksums, manifests, the artifact codec, ledger
//! records and project configuration. Nothing here touches a database.

pub mod artifact;
pub mod checksum;
pub mod config;
pub mod discovery;
pub mod error;
pub mod history;
pub mod manifest;
pub mod version;

pub use artifact::{decode, decode_unverified, encode, ArtifactReader, ExtractedEntry};
pub use checksum::{
    compute_aggregate_checksum, compute_checksum, compute_file_digest, CHECKSUM_ALGORITHM,
};
pub use config::Config;
pub use discovery::discover_migration_files;
pub use error::{CoreError, CoreResult};
pub use history::{AppliedVersion, EffectiveHistory, SYSTEM_VERSION};
pub use manifest::{
    build_manifest, FileCategory, Manifest, ManifestFile, ManifestMetadata, MigrationFile,
    PlatformInfo, Provenance, SignatureBlock,
};
pub use version::{BumpKind, Version};
