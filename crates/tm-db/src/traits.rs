//! Database gateway traits

use crate::error::DbResult;
use crate::lock::LockHandle;
use async_trait::async_trait;
use std::time::Duration;
use tm_core::AppliedVersion;

/// Database abstraction trait for Tidemark
///
/// Implementations must be Send + Sync for async operation. Plain statements
/// run in auto-commit mode; [`Database::begin`] opens an isolated transaction
/// scope that does not interleave with auto-commit statements from other
/// callers.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute SQL that modifies data, returns affected rows
    async fn execute(&self, sql: &str) -> DbResult<usize>;

    /// Execute multiple SQL statements
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Run a parameterised query, returning each row's columns as strings
    async fn query_rows(&self, sql: &str, params: &[&str]) -> DbResult<Vec<Vec<Option<String>>>>;

    /// Open a transaction scope
    async fn begin(&self) -> DbResult<Box<dyn Transaction>>;

    /// Try once to take the named lock; never waits for a current holder
    ///
    /// `timeout` bounds the acquisition attempt itself. The returned handle
    /// is the only way to release the lock.
    async fn try_lock(&self, key: &str, timeout: Duration) -> DbResult<LockHandle>;

    /// Every ledger row, oldest first
    async fn applied_versions(&self) -> DbResult<Vec<AppliedVersion>>;

    /// Append a ledger row in auto-commit mode
    async fn record_version(&self, record: &AppliedVersion) -> DbResult<()>;
}

/// A transaction scope
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait Transaction: Send {
    /// Execute one or more statements inside the transaction
    ///
    /// Dropping the returned future before it completes cancels the
    /// statement where the backend supports it.
    async fn execute_batch(&mut self, sql: &str) -> DbResult<()>;

    /// Append a ledger row that commits or rolls back with the transaction
    async fn record_version(&mut self, record: &AppliedVersion) -> DbResult<()>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> DbResult<()>;

    /// Roll the transaction back
    async fn rollback(self: Box<Self>) -> DbResult<()>;
}
