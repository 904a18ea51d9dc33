//! Table-based migration lock with a release capability
//!
//! A lock is a row in `tidemark_locks` keyed by the lock name. Whoever
//! inserts the row holds the lock; the row carries a random token so only
//! the handle returned at acquisition can delete it. Rows carry a lease so a
//! lock left behind by a crashed process can be taken over once it expires.

use crate::error::{DbError, DbResult};
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::Connection;
use std::sync::Arc;
use std::time::Duration;

/// Table holding active locks
pub const LOCK_TABLE: &str = "tidemark_locks";

/// Something that can delete a lock row it granted
pub trait LockRelease: Send + Sync {
    /// Release `key` if it is still held with `token`
    fn release(&self, key: &str, token: &str) -> DbResult<()>;
}

/// Capability to release one acquired lock
///
/// Releasing consumes the handle, so a lock cannot be released twice through
/// it. A handle dropped without an explicit release (for example while
/// unwinding) releases on a best-effort basis.
pub struct LockHandle {
    key: String,
    token: String,
    releaser: Option<Arc<dyn LockRelease>>,
}

impl LockHandle {
    pub fn new(
        key: impl Into<String>,
        token: impl Into<String>,
        releaser: Arc<dyn LockRelease>,
    ) -> Self {
        Self {
            key: key.into(),
            token: token.into(),
            releaser: Some(releaser),
        }
    }

    /// Lock name
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Token proving ownership of the lock row
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Release the lock
    pub fn release(mut self) -> DbResult<()> {
        match self.releaser.take() {
            Some(releaser) => releaser.release(&self.key, &self.token),
            None => Ok(()),
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Some(releaser) = self.releaser.take() {
            if let Err(e) = releaser.release(&self.key, &self.token) {
                log::warn!("Failed to release lock '{}' on drop: {}", self.key, e);
            }
        }
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.key)
            .field("released", &self.releaser.is_none())
            .finish()
    }
}

/// Format a timestamp so that string order equals time order
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn ensure_lock_table(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {LOCK_TABLE} (
             lock_key    VARCHAR PRIMARY KEY,
             token       VARCHAR NOT NULL,
             holder      VARCHAR NOT NULL,
             acquired_at VARCHAR NOT NULL,
             expires_at  VARCHAR NOT NULL
         );"
    ))
    .map_err(|e| DbError::ConnectionError(format!("failed to create lock table: {e}")))
}

/// Make one attempt to insert the lock row
///
/// Returns `Ok(())` when `token` now owns `key`, `DbError::LockHeld` when
/// someone else does.
pub(crate) fn try_acquire(
    conn: &Connection,
    key: &str,
    token: &str,
    holder: &str,
    lease: Duration,
) -> DbResult<()> {
    let now = Utc::now();
    let lease = chrono::Duration::from_std(lease)
        .map_err(|e| DbError::Internal(format!("invalid lock lease: {e}")))?;

    let expired = conn.execute(
        &format!("DELETE FROM {LOCK_TABLE} WHERE lock_key = ? AND expires_at < ?"),
        duckdb::params![key, timestamp(now)],
    )?;
    if expired > 0 {
        log::warn!("Took over expired lock '{}'", key);
    }

    conn.execute(
        &format!(
            "INSERT INTO {LOCK_TABLE} (lock_key, token, holder, acquired_at, expires_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT DO NOTHING"
        ),
        duckdb::params![key, token, holder, timestamp(now), timestamp(now + lease)],
    )?;

    let (owner, owner_holder): (String, String) = conn.query_row(
        &format!("SELECT token, holder FROM {LOCK_TABLE} WHERE lock_key = ?"),
        duckdb::params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    if owner == token {
        Ok(())
    } else {
        Err(DbError::LockHeld {
            key: key.to_string(),
            holder: owner_holder,
        })
    }
}

pub(crate) fn release(conn: &Connection, key: &str, token: &str) -> DbResult<()> {
    let deleted = conn.execute(
        &format!("DELETE FROM {LOCK_TABLE} WHERE lock_key = ? AND token = ?"),
        duckdb::params![key, token],
    )?;
    if deleted == 0 {
        log::debug!("Lock '{}' was no longer held at release", key);
    }
    Ok(())
}

/// Current holder of `key`, if any
#[cfg(any(test, feature = "test-support"))]
pub(crate) fn holder(conn: &Connection, key: &str) -> DbResult<Option<String>> {
    let mut stmt = conn.prepare(&format!("SELECT holder FROM {LOCK_TABLE} WHERE lock_key = ?"))?;
    let mut rows = stmt.query(duckdb::params![key])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}
