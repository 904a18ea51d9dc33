//! Result structures returned by engine operations

use chrono::{DateTime, Utc};
use serde::Serialize;
use tm_core::{AppliedVersion, FileCategory};

/// Phase of one orchestrated operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Verifying,
    Locking,
    Planning,
    Executing,
    Recording,
    Unlocking,
    Done,
    Failed,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineState::Idle => "idle",
            EngineState::Verifying => "verifying",
            EngineState::Locking => "locking",
            EngineState::Planning => "planning",
            EngineState::Executing => "executing",
            EngineState::Recording => "recording",
            EngineState::Unlocking => "unlocking",
            EngineState::Done => "done",
            EngineState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Which mutating operation produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Apply,
    Rollback,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Apply => write!(f, "apply"),
            Operation::Rollback => write!(f, "rollback"),
        }
    }
}

/// Outcome of verifying one artifact
///
/// Verification is advisory: problems are collected here and the caller
/// decides whether to proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Version that was verified
    pub version: String,

    /// Aggregate checksum recorded in the manifest, when one could be read
    pub checksum: Option<String>,

    /// Whether a signature check ran
    pub signature_checked: bool,

    /// Human-readable problems; empty when the artifact verified cleanly
    pub errors: Vec<String>,
}

impl VerificationReport {
    pub(crate) fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            checksum: None,
            signature_checked: false,
            errors: Vec::new(),
        }
    }

    /// True when no problems were found
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors joined into one line
    pub fn summary(&self) -> String {
        self.errors.join("; ")
    }
}

/// One SQL unit scheduled for execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUnit {
    /// Path inside the artifact
    pub path: String,

    /// File category
    pub category: FileCategory,

    /// Content digest from the manifest
    pub checksum: String,
}

/// Result of an apply or rollback
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub version: String,
    pub operation: Operation,
    pub dry_run: bool,
    pub verification: VerificationReport,

    /// Units in execution order, one inner list per category stage
    pub planned: Vec<Vec<PlannedUnit>>,

    /// Units that ran to completion
    pub executed: usize,

    pub state: EngineState,
    pub duration_secs: f64,
}

impl ApplyReport {
    /// Planned units flattened in execution order
    pub fn planned_units(&self) -> impl Iterator<Item = &PlannedUnit> {
        self.planned.iter().flatten()
    }
}

/// Result of publishing an artifact
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub version: String,
    pub checksum: String,
    pub files: usize,
    pub signed: bool,

    /// Where the store put the artifact
    pub location: String,
}

/// Read-only view of the ledger and the artifact store
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Most recently applied version still in effect
    pub current: Option<String>,

    /// Ledger rows, oldest first, without the bootstrap row
    pub history: Vec<AppliedVersion>,

    /// Store versions not currently in effect, ascending
    pub pending: Vec<String>,

    /// Every version the store knows, ascending
    pub known: Vec<String>,

    pub checked_at: DateTime<Utc>,
}

impl StatusReport {
    /// Successful ledger rows only
    pub fn successful(&self) -> impl Iterator<Item = &AppliedVersion> {
        self.history.iter().filter(|r| r.success)
    }
}
