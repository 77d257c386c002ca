//! # Bulk Ingestor
//!
//! Replaces a table's contents with the data rows of a [`SpreadsheetGrid`].
//!
//! ## Replace, Never Merge
//!
//! Every ingestion deletes all existing rows first, then inserts the grid's
//! rows in their original order. Running the same ingestion twice leaves the
//! table in the same final state.
//!
//! ## Two Modes
//!
//! ```text
//! PerRow:   DELETE ─► INSERT row 1 ─► INSERT row 2 ─► ... (each auto-committed)
//!                            │
//!                            └─ failure at row k: rows 1..k-1 stay, old rows gone
//!
//! Atomic:   BEGIN ─► DELETE ─► INSERT rows 1..n (multi-row) ─► COMMIT
//!                            │
//!                            └─ failure anywhere: ROLLBACK, old rows intact
//! ```
//!
//! `PerRow` reports the failing row index and leaves a partially replaced
//! table that the caller must re-ingest. `Atomic` never exposes a partial
//! state. Callers choose through [`IngestMode`].
//!
//! ## Headers
//!
//! Row 0 names the columns. Header names must be valid identifiers but are not
//! compared with the table's schema: an unknown column fails in the store.

use std::str::FromStr;

use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ident::{quote, validate_identifier, TableName};
use crate::provision::ensure_table_atomic;
use crate::types::{IngestReport, SpreadsheetGrid, Value};

/// Upper bound on bound parameters per statement.
///
/// This is SQLite's historical `SQLITE_MAX_VARIABLE_NUMBER`; newer builds
/// allow more but staying under it keeps any build working.
pub(crate) const MAX_BOUND_PARAMS: usize = 999;

// =============================================================================
// Mode
// =============================================================================

/// How an ingestion is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Delete and insert in one transaction using multi-row inserts.
    #[default]
    Atomic,
    /// Delete, then insert and commit one row at a time.
    PerRow,
}

impl IngestMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IngestMode::Atomic => "atomic",
            IngestMode::PerRow => "per-row",
        }
    }
}

impl FromStr for IngestMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(IngestMode::Atomic),
            "per-row" | "per_row" | "perrow" => Ok(IngestMode::PerRow),
            other => Err(Error::Config(format!(
                "unknown ingest mode '{other}' (expected 'atomic' or 'per-row')"
            ))),
        }
    }
}

// =============================================================================
// Ingestion
// =============================================================================

/// Counts produced by a replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replaced {
    pub rows_deleted: usize,
    pub rows_written: usize,
}

/// Ensures the family table exists, then replaces its contents with `grid`.
///
/// A newly created dataset or planogram table also gets its key recorded in
/// the family catalog.
pub fn provision_and_ingest(
    conn: &mut Connection,
    table: &TableName,
    grid: &SpreadsheetGrid,
    mode: IngestMode,
) -> Result<IngestReport> {
    let provisioned = ensure_table_atomic(conn, table)?;
    let replaced = ingest(conn, table, grid, mode)?;
    Ok(IngestReport {
        table: table.to_string(),
        provisioned,
        rows_deleted: replaced.rows_deleted,
        rows_written: replaced.rows_written,
    })
}

/// Replaces every row of `table` with the data rows of `grid`.
///
/// # Errors
///
/// - `Error::Validation` if the grid has no header row or a data row is wider
///   than the header (checked before anything is deleted)
/// - `Error::InvalidIdentifier` for an unsafe header name
/// - `Error::IngestionRowFailed` (per-row mode) naming the first failing row
/// - `Error::IngestionAborted` (atomic mode) after a full rollback
pub fn ingest(
    conn: &mut Connection,
    table: &TableName,
    grid: &SpreadsheetGrid,
    mode: IngestMode,
) -> Result<Replaced> {
    let headers = grid.headers()?;
    for header in &headers {
        validate_identifier(header)?;
    }
    let rows = shaped_rows(grid, headers.len())?;

    let replaced = match mode {
        IngestMode::PerRow => ingest_per_row(conn, table, &headers, &rows)?,
        IngestMode::Atomic => ingest_atomic(conn, table, &headers, &rows)?,
    };

    info!(
        table = %table,
        mode = mode.as_str(),
        deleted = replaced.rows_deleted,
        written = replaced.rows_written,
        "replaced table contents"
    );
    Ok(replaced)
}

/// Pads short rows with nulls; rejects rows wider than the header.
fn shaped_rows(grid: &SpreadsheetGrid, width: usize) -> Result<Vec<Vec<Value>>> {
    grid.data_rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() > width {
                return Err(Error::Validation(format!(
                    "data row {} has {} cells but the header has {}",
                    i + 1,
                    row.len(),
                    width
                )));
            }
            let mut row = row.clone();
            row.resize(width, Value::Null);
            Ok(row)
        })
        .collect()
}

fn column_list(headers: &[String]) -> String {
    headers
        .iter()
        .map(|h| quote(h))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(width: usize) -> String {
    format!("({})", vec!["?"; width].join(", "))
}

fn ingest_per_row(
    conn: &Connection,
    table: &TableName,
    headers: &[String],
    rows: &[Vec<Value>],
) -> Result<Replaced> {
    let rows_deleted = conn.execute(&format!("DELETE FROM {}", table.quoted()), [])?;
    debug!(table = %table, rows_deleted, "existing records deleted");

    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        table.quoted(),
        column_list(headers),
        placeholders(headers.len())
    );

    for (i, row) in rows.iter().enumerate() {
        let inserted = conn
            .prepare_cached(&sql)
            .and_then(|mut stmt| stmt.execute(params_from_iter(row.iter())));
        if let Err(source) = inserted {
            warn!(table = %table, row = i + 1, error = %source, "row insert failed; table is partially replaced");
            return Err(Error::IngestionRowFailed { row: i + 1, source });
        }
    }

    Ok(Replaced {
        rows_deleted,
        rows_written: rows.len(),
    })
}

fn ingest_atomic(
    conn: &mut Connection,
    table: &TableName,
    headers: &[String],
    rows: &[Vec<Value>],
) -> Result<Replaced> {
    let aborted = |source: rusqlite::Error| Error::IngestionAborted {
        table: table.to_string(),
        source,
    };

    // Dropping `tx` on any early return rolls the whole replace back.
    let tx = conn.transaction().map_err(aborted)?;

    let rows_deleted = tx
        .execute(&format!("DELETE FROM {}", table.quoted()), [])
        .map_err(aborted)?;

    let rows_per_statement = (MAX_BOUND_PARAMS / headers.len()).max(1);
    for chunk in rows.chunks(rows_per_statement) {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table.quoted(),
            column_list(headers),
            vec![placeholders(headers.len()); chunk.len()].join(", ")
        );
        tx.execute(&sql, params_from_iter(chunk.iter().flatten()))
            .map_err(aborted)?;
    }

    tx.commit().map_err(aborted)?;

    Ok(Replaced {
        rows_deleted,
        rows_written: rows.len(),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{resolve, TableFamily};
    use crate::schema::Database;
    use crate::types::Provisioned;

    fn count(conn: &Connection, table: &TableName) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.quoted()), [], |r| r.get(0))
            .unwrap()
    }

    fn three_row_grid() -> SpreadsheetGrid {
        SpreadsheetGrid::from_parts(
            &["marca", "vol_ytd"],
            vec![
                vec!["Coca".into(), 10.0.into()],
                vec!["Pepsi".into(), 7.5.into()],
                vec!["Jarritos".into(), Value::Null],
            ],
        )
    }

    #[test]
    fn test_provision_and_ingest_fresh_dataset() {
        let mut db = Database::open_in_memory().unwrap();
        let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();

        let report =
            provision_and_ingest(db.connection_mut(), &table, &three_row_grid(), IngestMode::Atomic)
                .unwrap();

        assert_eq!(report.provisioned, Provisioned::Created);
        assert_eq!(report.rows_written, 3);
        assert_eq!(count(db.connection(), &table), 3);
    }

    #[test]
    fn test_replace_not_merge_both_modes() {
        for mode in [IngestMode::Atomic, IngestMode::PerRow] {
            let mut db = Database::open_in_memory().unwrap();
            let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();
            provision_and_ingest(db.connection_mut(), &table, &three_row_grid(), mode).unwrap();

            let smaller = SpreadsheetGrid::from_parts(&["marca"], vec![vec!["Solo".into()]]);
            let report = provision_and_ingest(db.connection_mut(), &table, &smaller, mode).unwrap();

            assert_eq!(report.provisioned, Provisioned::AlreadyExists);
            assert_eq!(report.rows_deleted, 3);
            assert_eq!(count(db.connection(), &table), 1, "mode {mode:?}");
        }
    }

    #[test]
    fn test_header_only_grid_clears_table() {
        let mut db = Database::open_in_memory().unwrap();
        let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();
        provision_and_ingest(db.connection_mut(), &table, &three_row_grid(), IngestMode::Atomic)
            .unwrap();

        let empty = SpreadsheetGrid::from_parts(&["marca", "vol_ytd"], vec![]);
        let replaced = ingest(db.connection_mut(), &table, &empty, IngestMode::Atomic).unwrap();
        assert_eq!(replaced.rows_written, 0);
        assert_eq!(count(db.connection(), &table), 0);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let mut db = Database::open_in_memory().unwrap();
        let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();
        let grid = SpreadsheetGrid::from_parts(&["marca", "vol_ytd"], vec![vec!["Coca".into()]]);

        provision_and_ingest(db.connection_mut(), &table, &grid, IngestMode::Atomic).unwrap();
        let vol: Option<f64> = db
            .connection()
            .query_row(&format!("SELECT vol_ytd FROM {}", table.quoted()), [], |r| r.get(0))
            .unwrap();
        assert_eq!(vol, None);
    }

    #[test]
    fn test_wide_row_rejected_before_delete() {
        let mut db = Database::open_in_memory().unwrap();
        let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();
        provision_and_ingest(db.connection_mut(), &table, &three_row_grid(), IngestMode::PerRow)
            .unwrap();

        let wide = SpreadsheetGrid::from_parts(&["marca"], vec![vec!["a".into(), "b".into()]]);
        let err = ingest(db.connection_mut(), &table, &wide, IngestMode::PerRow).unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(count(db.connection(), &table), 3);
    }

    #[test]
    fn test_unknown_column_atomic_keeps_old_rows() {
        let mut db = Database::open_in_memory().unwrap();
        let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();
        provision_and_ingest(db.connection_mut(), &table, &three_row_grid(), IngestMode::Atomic)
            .unwrap();

        let bad = SpreadsheetGrid::from_parts(&["no_such_column"], vec![vec!["x".into()]]);
        let err = ingest(db.connection_mut(), &table, &bad, IngestMode::Atomic).unwrap_err();

        assert!(matches!(err, Error::IngestionAborted { .. }));
        assert_eq!(count(db.connection(), &table), 3);
    }

    #[test]
    fn test_unknown_column_per_row_leaves_partial_state() {
        let mut db = Database::open_in_memory().unwrap();
        let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();
        provision_and_ingest(db.connection_mut(), &table, &three_row_grid(), IngestMode::Atomic)
            .unwrap();

        let bad = SpreadsheetGrid::from_parts(&["no_such_column"], vec![vec!["x".into()]]);
        let err = ingest(db.connection_mut(), &table, &bad, IngestMode::PerRow).unwrap_err();

        assert!(matches!(err, Error::IngestionRowFailed { row: 1, .. }));
        // The delete already committed.
        assert_eq!(count(db.connection(), &table), 0);
    }

    #[test]
    fn test_unsafe_header_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();
        let grid = SpreadsheetGrid::from_parts(&["marca; DROP TABLE data"], vec![]);
        let err = ingest(db.connection_mut(), &table, &grid, IngestMode::Atomic).unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_large_grid_spans_multiple_statements() {
        let mut db = Database::open_in_memory().unwrap();
        let table = resolve(TableFamily::Planogram, &["big"]).unwrap();
        let headers = ["frente", "skus", "volumen", "espacio"];
        let data = (0..1_000)
            .map(|i| headers.iter().map(|_| Value::Real(i as f64)).collect())
            .collect();
        let grid = SpreadsheetGrid::from_parts(&headers, data);

        let report =
            provision_and_ingest(db.connection_mut(), &table, &grid, IngestMode::Atomic).unwrap();
        assert_eq!(report.rows_written, 1_000);
        assert_eq!(count(db.connection(), &table), 1_000);
    }

    #[test]
    fn test_ingest_mode_from_str() {
        assert_eq!("atomic".parse::<IngestMode>().unwrap(), IngestMode::Atomic);
        assert_eq!("Per-Row".parse::<IngestMode>().unwrap(), IngestMode::PerRow);
        assert!(matches!("bulk".parse::<IngestMode>(), Err(Error::Config(_))));
    }
}
