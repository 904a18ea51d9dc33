//! Error types for tm-engine

use crate::report::VerificationReport;
use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;
use tm_core::CoreError;
use tm_db::DbError;

/// Failure taxonomy callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Artifact or file digest mismatch
    Checksum,
    /// Invalid, duplicate or out-of-order version
    Version,
    /// Migration lock unavailable
    Lock,
    /// Signature or provenance failure
    Security,
    /// Connection or SQL failure
    Database,
    /// Artifact store failure
    Storage,
    /// Advisory verification report with problems
    Verification,
    /// Executing phase exceeded its bound
    Timeout,
    /// Rejected options or settings
    Config,
    /// Anything else
    Internal,
}

/// Migration engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// M001: Verification found problems and the caller did not force
    #[error("[M001] Verification failed for {}: {}", .0.version, .0.summary())]
    Verification(VerificationReport),

    /// M002: Artifact could not be decoded even without verification
    #[error("[M002] Artifact {version} is unreadable: {source}")]
    Checksum {
        version: String,
        #[source]
        source: CoreError,
    },

    /// M003: Version string rejected
    #[error("[M003] {0}")]
    InvalidVersion(#[source] CoreError),

    /// M004: Version already applied
    #[error("[M004] Version {version} is already applied")]
    AlreadyApplied { version: String },

    /// M005: Version is not currently applied
    #[error("[M005] Version {version} is not applied")]
    NotApplied { version: String },

    /// M006: Version would be applied or rolled back out of order
    #[error("[M006] Version {version} is out of order (current version is {current})")]
    OutOfOrder { version: String, current: String },

    /// M007: A declared dependency is not applied
    #[error("[M007] Version {version} requires {dependency}, which is not applied")]
    MissingDependency { version: String, dependency: String },

    /// M008: Rollback requested but the artifact carries no rollback files
    #[error("[M008] Version {version} has no rollback files")]
    NoRollback { version: String },

    /// M009: Migration lock could not be taken
    #[error("[M009] Could not acquire migration lock '{key}': {source}")]
    Lock {
        key: String,
        #[source]
        source: DbError,
    },

    /// M010: Signing or signature verification failed
    #[error("[M010] Security error: {0}")]
    Security(String),

    /// M011: Database failure outside unit execution
    #[error("[M011] {0}")]
    Database(#[from] DbError),

    /// M012: A migration unit failed
    #[error("[M012] Migration unit '{path}' failed: {source}")]
    Execution {
        path: String,
        #[source]
        source: DbError,
    },

    /// M013: Artifact store failure
    #[error("[M013] {0}")]
    Storage(#[from] StoreError),

    /// M014: Executing phase exceeded its bound
    #[error("[M014] Migration timed out after {after:?}")]
    Timeout { after: Duration },

    /// M015: Invalid operation options
    #[error("[M015] Invalid options: {0}")]
    InvalidOptions(String),

    /// M016: Manifest serialization or other core failure
    #[error("[M016] {0}")]
    Core(#[from] CoreError),
}

impl EngineError {
    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Verification(_) => ErrorKind::Verification,
            EngineError::Checksum { .. } => ErrorKind::Checksum,
            EngineError::InvalidVersion(_)
            | EngineError::AlreadyApplied { .. }
            | EngineError::NotApplied { .. }
            | EngineError::OutOfOrder { .. }
            | EngineError::MissingDependency { .. }
            | EngineError::NoRollback { .. } => ErrorKind::Version,
            EngineError::Lock { .. } => ErrorKind::Lock,
            EngineError::Security(_) => ErrorKind::Security,
            EngineError::Database(_) | EngineError::Execution { .. } => ErrorKind::Database,
            EngineError::Storage(_) => ErrorKind::Storage,
            EngineError::Timeout { .. } => ErrorKind::Timeout,
            EngineError::InvalidOptions(_) => ErrorKind::Config,
            EngineError::Core(e) if e.is_integrity_failure() => ErrorKind::Checksum,
            EngineError::Core(CoreError::InvalidEncoding { .. }) => ErrorKind::Verification,
            EngineError::Core(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias for EngineError
pub type EngineResult<T> = Result<T, EngineError>;
