//! Ledger records and replay of the applied-version history

use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version recorded by the ledger's own bootstrap row
pub const SYSTEM_VERSION: &str = "0.0.0";

/// One row of the append-only history ledger: a single apply or rollback attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedVersion {
    /// Unique row identifier (attempts, not versions, are unique)
    pub id: String,

    /// Version the attempt targeted
    pub version: String,

    /// Aggregate checksum of the manifest that was applied
    pub checksum: String,

    /// When the attempt finished
    pub applied_at: DateTime<Utc>,

    /// Identity of the operator or process that ran the attempt
    pub applied_by: String,

    /// Whether the attempt committed
    pub success: bool,

    /// Error text for failed attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Set when this row records a rollback of the named version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_of: Option<String>,

    /// Serialized manifest captured at apply time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,

    /// Marks the ledger's own bootstrap row
    #[serde(default)]
    pub is_system: bool,
}

impl AppliedVersion {
    /// Whether this row records a rollback rather than an apply
    pub fn is_rollback(&self) -> bool {
        self.rollback_of.is_some()
    }

    /// Parsed version, if the stored string is valid
    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(&self.version).ok()
    }
}

/// Versions currently in effect, derived by replaying the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveHistory {
    /// Effective versions in the order they were applied
    applied: Vec<Version>,
}

impl EffectiveHistory {
    /// Replay successful, non-system rows in `applied_at` order
    ///
    /// An apply row adds its version; a rollback row removes the version it
    /// reverses. Failed attempts never change the effective state.
    pub fn replay(records: &[AppliedVersion]) -> Self {
        let mut rows: Vec<&AppliedVersion> = records
            .iter()
            .filter(|r| r.success && !r.is_system)
            .collect();
        // Stable sort keeps insertion order for identical timestamps
        rows.sort_by_key(|r| r.applied_at);

        let mut applied: Vec<Version> = Vec::new();
        for row in rows {
            match &row.rollback_of {
                Some(target) => {
                    if let Ok(target) = Version::parse(target) {
                        applied.retain(|v| *v != target);
                    }
                }
                None => {
                    if let Some(version) = row.parsed_version() {
                        applied.retain(|v| *v != version);
                        applied.push(version);
                    }
                }
            }
        }

        Self { applied }
    }

    /// The most recently applied version still in effect
    pub fn current(&self) -> Option<&Version> {
        self.applied.last()
    }

    /// Whether `version` is currently applied
    pub fn is_applied(&self, version: &Version) -> bool {
        self.applied.contains(version)
    }

    /// All effective versions in application order
    pub fn applied(&self) -> &[Version] {
        &self.applied
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
