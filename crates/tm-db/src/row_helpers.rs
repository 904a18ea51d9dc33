//! Shared helpers for reading DuckDB row columns as strings.

use crate::error::{DbError, DbResult};

/// Read a column value as an optional String, trying multiple DuckDB types.
///
/// DuckDB integer columns return `None` for `Option<String>`, so we try
/// String -> i64 -> f64 -> bool before treating the value as NULL.
pub(crate) fn get_column_as_string(row: &duckdb::Row<'_>, idx: usize) -> Option<String> {
    if let Ok(Some(s)) = row.get::<_, Option<String>>(idx) {
        return Some(s);
    }
    if let Ok(Some(n)) = row.get::<_, Option<i64>>(idx) {
        return Some(n.to_string());
    }
    if let Ok(Some(f)) = row.get::<_, Option<f64>>(idx) {
        return Some(f.to_string());
    }
    if let Ok(Some(b)) = row.get::<_, Option<bool>>(idx) {
        return Some(b.to_string());
    }
    None
}

/// Run a prepared statement with string parameters and collect every row.
///
/// `row.as_ref().column_count()` is read per row because DuckDB panics on
/// `stmt.column_count()` before the statement has executed.
pub(crate) fn collect_rows(
    stmt: &mut duckdb::Statement<'_>,
    params: &[&str],
) -> DbResult<Vec<Vec<Option<String>>>> {
    stmt.query_map(duckdb::params_from_iter(params.iter()), |row| {
        let col_count = row.as_ref().column_count();
        Ok((0..col_count)
            .map(|i| get_column_as_string(row, i))
            .collect())
    })
    .map_err(|e| DbError::ExecutionError(format!("query failed: {e}")))?
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| DbError::ExecutionError(format!("row error: {e}")))
}
