//! tm-db - Database gateway for Tidemark
//!
//! This crate provides the [`Database`] trait used by the migration engine,
//! a DuckDB implementation, the table-based migration lock and the
//! append-only history ledger.

pub mod duckdb;
pub mod error;
pub mod ledger;
pub mod lock;
pub(crate) mod row_helpers;
pub mod traits;

pub use crate::duckdb::{DuckDbBackend, DEFAULT_LOCK_LEASE};
pub use error::{DbError, DbResult};
pub use ledger::LEDGER_TABLE;
pub use lock::{LockHandle, LockRelease, LOCK_TABLE};
pub use traits::{Database, Transaction};
