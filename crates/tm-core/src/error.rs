//! Error types for tm-core

use thiserror::Error;

/// Core error type for Tidemark
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Failed to parse configuration file
    #[error("[E002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// E003: Invalid configuration value
    #[error("[E003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// V001: Version string does not follow MAJOR.MINOR.PATCH[-PRERELEASE]
    #[error("[V001] Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    /// C001: A file's content does not hash to the digest recorded in the manifest
    #[error("[C001] Checksum mismatch for '{path}': expected {expected}, got {actual}")]
    FileChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// C002: The aggregate manifest checksum does not match the files
    #[error("[C002] Aggregate checksum mismatch: expected {expected}, got {actual}")]
    AggregateChecksumMismatch { expected: String, actual: String },

    /// C003: A file's byte size does not match the manifest
    #[error("[C003] Size mismatch for '{path}': expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// A001: The archive is missing a file the manifest lists
    #[error("[A001] Archive is missing file listed in manifest: {path}")]
    MissingArchiveEntry { path: String },

    /// A002: The archive holds a file the manifest does not list
    #[error("[A002] Archive contains file not listed in manifest: {path}")]
    UnexpectedArchiveEntry { path: String },

    /// A003: Two files share the same relative path
    #[error("[A003] Duplicate file path in manifest: {path}")]
    DuplicatePath { path: String },

    /// A004: The archive bytes are not a valid artifact
    #[error("[A004] Malformed artifact archive: {0}")]
    MalformedArchive(String),

    /// A005: A migration file is not valid UTF-8 text
    #[error("[A005] Migration file '{path}' is not valid UTF-8 (invalid byte at offset {offset})")]
    InvalidEncoding { path: String, offset: usize },

    /// E014: IO error
    #[error("[E014] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E016: IO error with file path context
    #[error("[E016] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// E015: YAML parse error
    #[error("[E015] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether this error is a digest, size or archive-integrity failure
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            CoreError::FileChecksumMismatch { .. }
                | CoreError::AggregateChecksumMismatch { .. }
                | CoreError::SizeMismatch { .. }
                | CoreError::MissingArchiveEntry { .. }
                | CoreError::UnexpectedArchiveEntry { .. }
        )
    }
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
