//! tm-engine - Migration engine for Tidemark
//!
//! The [`MigrationEngine`] verifies stored artifacts, serializes concurrent
//! runs through the database lock, executes migration units inside one
//! transaction per version and records every attempt in the history ledger.

pub mod engine;
pub mod error;
pub mod options;
pub mod plan;
pub mod report;
pub mod security;
pub mod store;

pub use engine::MigrationEngine;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use options::{AfterEachHook, ApplyOptions, BeforeEachHook, EngineSettings};
pub use report::{
    ApplyReport, EngineState, Operation, PlannedUnit, PublishReport, StatusReport,
    VerificationReport,
};
pub use security::{BuildInfo, Ed25519Provider, SecurityProvider};
pub use store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore, StoreError};
