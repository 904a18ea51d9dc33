//! DuckDB database backend implementation

use crate::error::{DbError, DbResult};
use crate::ledger;
use crate::lock::{self, LockHandle, LockRelease};
use crate::row_helpers::collect_rows;
use crate::traits::{Database, Transaction};
use async_trait::async_trait;
use duckdb::{Connection, InterruptHandle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tm_core::AppliedVersion;

/// Default lease on a lock row before another process may take it over
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(60 * 60);

fn lock_conn(conn: &Mutex<Connection>) -> DbResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| DbError::MutexPoisoned(e.to_string()))
}

/// Run `f` against `conn` on the blocking thread pool
async fn run_blocking<T, F>(conn: Arc<Mutex<Connection>>, f: F) -> DbResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = lock_conn(&conn)?;
        f(&conn)
    })
    .await
    .map_err(|e| DbError::Internal(format!("database task failed: {e}")))?
}

/// Connection state shared with outstanding lock handles
struct Shared {
    conn: Arc<Mutex<Connection>>,
}

impl LockRelease for Shared {
    fn release(&self, key: &str, token: &str) -> DbResult<()> {
        let conn = lock_conn(&self.conn)?;
        lock::release(&conn, key, token)
    }
}

/// DuckDB database backend
///
/// Auto-commit statements share one connection. Each transaction gets its
/// own cloned connection to the same database so that lock and ledger
/// writes from other callers never land inside it. Every statement runs on
/// the blocking thread pool.
pub struct DuckDbBackend {
    shared: Arc<Shared>,
    holder: String,
    lock_lease: Duration,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Self::bootstrap(conn)
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::ConnectionError(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{}: {e}", path.display())))?;
        Self::bootstrap(conn)
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    /// Name recorded as the holder of locks taken through this backend
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    /// Lease applied to newly acquired locks
    pub fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    fn bootstrap(conn: Connection) -> DbResult<Self> {
        ledger::ensure_ledger(&conn)?;
        lock::ensure_lock_table(&conn)?;
        Ok(Self {
            shared: Arc::new(Shared {
                conn: Arc::new(Mutex::new(conn)),
            }),
            holder: format!("pid-{}", std::process::id()),
            lock_lease: DEFAULT_LOCK_LEASE,
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
    {
        run_blocking(Arc::clone(&self.shared.conn), f).await
    }
}

/// Inspection helpers for tests of code built on this backend
#[cfg(any(test, feature = "test-support"))]
impl DuckDbBackend {
    /// Check if a table or view exists
    pub async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        // Handle schema-qualified names
        let (schema, table) = match name.rfind('.') {
            Some(pos) => (name[..pos].to_string(), name[pos + 1..].to_string()),
            None => ("main".to_string(), name.to_string()),
        };
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name = ?",
                duckdb::params![schema, table],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    /// Number of rows `sql` returns
    pub async fn query_count(&self, sql: &str) -> DbResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM ({})", sql);
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    /// Holder of the named lock, if it is currently taken
    pub fn lock_holder(&self, key: &str) -> DbResult<Option<String>> {
        let conn = lock_conn(&self.shared.conn)?;
        lock::holder(&conn, key)
    }
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            conn.execute(&sql, [])
                .map_err(|e| DbError::ExecutionError(format!("{}: {}", e, sql)))
        })
        .await
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            conn.execute_batch(&sql)
                .map_err(|e| DbError::ExecutionError(e.to_string()))
        })
        .await
    }

    async fn query_rows(&self, sql: &str, params: &[&str]) -> DbResult<Vec<Vec<Option<String>>>> {
        let sql = sql.to_string();
        let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| DbError::ExecutionError(format!("{}: {}", e, sql)))?;
            let params: Vec<&str> = params.iter().map(String::as_str).collect();
            collect_rows(&mut stmt, &params)
        })
        .await
    }

    async fn begin(&self) -> DbResult<Box<dyn Transaction>> {
        let conn = self
            .with_conn(|main| {
                let conn = main.try_clone().map_err(|e| {
                    DbError::TransactionError(format!("cannot open connection: {e}"))
                })?;
                conn.execute_batch("BEGIN TRANSACTION")
                    .map_err(|e| DbError::TransactionError(format!("BEGIN failed: {e}")))?;
                Ok(conn)
            })
            .await?;
        let interrupt = conn.interrupt_handle();
        Ok(Box::new(DuckDbTransaction {
            conn: Some(Arc::new(Mutex::new(conn))),
            interrupt,
        }))
    }

    async fn try_lock(&self, key: &str, timeout: Duration) -> DbResult<LockHandle> {
        let token = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + timeout;
        let (task_key, task_token) = (key.to_string(), token.clone());
        let holder = self.holder.clone();
        let lease = self.lock_lease;

        let attempt = self.with_conn(move |conn| {
            // Waited past the deadline for the connection; don't take a lock
            // nobody is left to release.
            if Instant::now() > deadline {
                return Err(DbError::Internal(format!(
                    "lock '{task_key}' acquisition timed out"
                )));
            }
            lock::try_acquire(conn, &task_key, &task_token, &holder, lease)
        });

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DbError::Internal(format!(
                    "lock '{key}' acquisition timed out after {timeout:?}"
                )))
            }
        }

        log::debug!("Acquired lock '{}' as {}", key, self.holder);
        let releaser: Arc<dyn LockRelease> = self.shared.clone();
        Ok(LockHandle::new(key, token, releaser))
    }

    async fn applied_versions(&self) -> DbResult<Vec<AppliedVersion>> {
        self.with_conn(ledger::load_records).await
    }

    async fn record_version(&self, record: &AppliedVersion) -> DbResult<()> {
        let record = record.clone();
        self.with_conn(move |conn| ledger::insert_record(conn, &record))
            .await
    }
}

/// Interrupts the transaction's running statement if its caller goes away
///
/// Dropping the future of [`DuckDbTransaction::execute_batch`] (for example
/// when a timeout fires) does not stop the blocking task, so the statement
/// is cancelled through DuckDB's interrupt handle instead.
struct InterruptOnDrop {
    handle: Arc<InterruptHandle>,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::SeqCst) {
            self.cancelled.store(true, Ordering::SeqCst);
            log::debug!("Interrupting statement abandoned by its caller");
            self.handle.interrupt();
        }
    }
}

/// Transaction on a dedicated DuckDB connection
struct DuckDbTransaction {
    conn: Option<Arc<Mutex<Connection>>>,
    interrupt: Arc<InterruptHandle>,
}

impl DuckDbTransaction {
    fn conn(&self) -> DbResult<Arc<Mutex<Connection>>> {
        self.conn
            .clone()
            .ok_or_else(|| DbError::TransactionError("transaction already finished".to_string()))
    }

    async fn finish(&mut self, statement: &'static str) -> DbResult<()> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| DbError::TransactionError("transaction already finished".to_string()))?;
        run_blocking(conn, move |conn| {
            conn.execute_batch(statement)
                .map_err(|e| DbError::TransactionError(format!("{statement} failed: {e}")))
        })
        .await
    }
}

#[async_trait]
impl Transaction for DuckDbTransaction {
    async fn execute_batch(&mut self, sql: &str) -> DbResult<()> {
        let conn = self.conn()?;
        let sql = sql.to_string();
        let cancelled = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let _guard = InterruptOnDrop {
            handle: Arc::clone(&self.interrupt),
            cancelled: Arc::clone(&cancelled),
            finished: Arc::clone(&finished),
        };

        run_blocking(conn, move |conn| {
            let result = if cancelled.load(Ordering::SeqCst) {
                Err(DbError::ExecutionError("statement cancelled".to_string()))
            } else {
                conn.execute_batch(&sql)
                    .map_err(|e| DbError::ExecutionError(e.to_string()))
            };
            finished.store(true, Ordering::SeqCst);
            result
        })
        .await
    }

    async fn record_version(&mut self, record: &AppliedVersion) -> DbResult<()> {
        let record = record.clone();
        run_blocking(self.conn()?, move |conn| ledger::insert_record(conn, &record)).await
    }

    async fn commit(mut self: Box<Self>) -> DbResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(mut self: Box<Self>) -> DbResult<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for DuckDbTransaction {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        // A statement still running on the blocking pool holds the mutex.
        // Closing its connection when that task ends discards the transaction.
        if let Ok(conn) = conn.try_lock() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                log::warn!("Failed to roll back abandoned transaction: {}", e);
            }
        };
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
