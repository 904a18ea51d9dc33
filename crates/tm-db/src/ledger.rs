//! Storage for the append-only history ledger.
//!
//! One row per apply or rollback attempt. Rows are only ever inserted; the
//! ledger exposes no update or delete.

use crate::error::{DbError, DbResult};
use crate::lock::timestamp;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use tm_core::{compute_checksum, AppliedVersion, SYSTEM_VERSION};

/// Ledger table name
pub const LEDGER_TABLE: &str = "tidemark_history";

const LEDGER_DDL: &str = "CREATE SEQUENCE IF NOT EXISTS tidemark_history_seq;
     CREATE TABLE IF NOT EXISTS tidemark_history (
         id          VARCHAR PRIMARY KEY,
         seq         BIGINT NOT NULL DEFAULT nextval('tidemark_history_seq'),
         version     VARCHAR NOT NULL,
         checksum    VARCHAR NOT NULL,
         applied_at  VARCHAR NOT NULL,
         applied_by  VARCHAR NOT NULL,
         success     BOOLEAN NOT NULL,
         error       VARCHAR,
         rollback_of VARCHAR,
         manifest    VARCHAR,
         is_system   BOOLEAN NOT NULL DEFAULT false
     );";

const SYSTEM_ROW_ID: &str = "tidemark-bootstrap";

/// Create the ledger table and write the bootstrap row once
pub(crate) fn ensure_ledger(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(LEDGER_DDL)
        .map_err(|e| DbError::ConnectionError(format!("failed to create ledger table: {e}")))?;

    let existing: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {LEDGER_TABLE} WHERE is_system"),
        [],
        |row| row.get(0),
    )?;
    if existing == 0 {
        log::debug!("Bootstrapping history ledger");
        insert_record(conn, &bootstrap_record())?;
    }
    Ok(())
}

fn bootstrap_record() -> AppliedVersion {
    AppliedVersion {
        id: SYSTEM_ROW_ID.to_string(),
        version: SYSTEM_VERSION.to_string(),
        checksum: compute_checksum(LEDGER_DDL),
        applied_at: Utc::now(),
        applied_by: "tidemark".to_string(),
        success: true,
        error: None,
        rollback_of: None,
        manifest: None,
        is_system: true,
    }
}

/// Append one row
pub(crate) fn insert_record(conn: &Connection, record: &AppliedVersion) -> DbResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO {LEDGER_TABLE}
                 (id, version, checksum, applied_at, applied_by,
                  success, error, rollback_of, manifest, is_system)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ),
        duckdb::params![
            record.id,
            record.version,
            record.checksum,
            timestamp(record.applied_at),
            record.applied_by,
            record.success,
            record.error,
            record.rollback_of,
            record.manifest,
            record.is_system,
        ],
    )
    .map_err(|e| {
        DbError::ExecutionError(format!("failed to record version {}: {e}", record.version))
    })?;
    Ok(())
}

/// Load every row in insertion order
pub(crate) fn load_records(conn: &Connection) -> DbResult<Vec<AppliedVersion>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, version, checksum, applied_at, applied_by,
                success, error, rollback_of, manifest, is_system
         FROM {LEDGER_TABLE}
         ORDER BY seq"
    ))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, bool>(9)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(
                id,
                version,
                checksum,
                applied_at,
                applied_by,
                success,
                error,
                rollback_of,
                manifest,
                is_system,
            )| {
                let applied_at = DateTime::parse_from_rfc3339(&applied_at)
                    .map_err(|e| {
                        DbError::LedgerDecode(format!(
                            "row {id}: bad applied_at '{applied_at}': {e}"
                        ))
                    })?
                    .with_timezone(&Utc);
                Ok(AppliedVersion {
                    id,
                    version,
                    checksum,
                    applied_at,
                    applied_by,
                    success,
                    error,
                    rollback_of,
                    manifest,
                    is_system,
                })
            },
        )
        .collect()
}
