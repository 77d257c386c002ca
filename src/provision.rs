//! # Schema Registry Provisioner
//!
//! Guarantees that a family table exists before anything reads or writes it,
//! and keeps the family catalog in step with the physical tables.
//!
//! ## Create-If-Absent
//!
//! ```text
//! exists? ──no──► CREATE TABLE IF NOT EXISTS ──► INSERT OR IGNORE catalog ──► Created
//!    │
//!    └─yes──────────────────────────────────────► INSERT OR IGNORE catalog ──► AlreadyExists
//! ```
//!
//! The existence check only decides which outcome to report. Creation itself
//! is `IF NOT EXISTS` and the catalog column is `UNIQUE`, so two requests that
//! both observe "absent" both succeed and leave exactly one table and one
//! catalog row behind. [`ensure_table_atomic`] additionally runs the three
//! steps inside one `IMMEDIATE` transaction, which makes the reported outcome
//! exact as well.
//!
//! Recording the key on the "already exists" path is a no-op for a consistent
//! catalog and repairs a catalog that lost its row.

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ident::{quote, TableName};
use crate::schema::{family_catalog, family_ddl, table_exists};
use crate::types::Provisioned;

/// Ensures `table` exists with its family's fixed schema.
///
/// Runs on whatever transaction state `conn` is in, which lets the order
/// writer provision inside its own transaction.
///
/// # Errors
///
/// - `Error::ProvisioningFailed` if the existence check, `CREATE TABLE`, or
///   catalog insert fails
/// - `Error::Validation` if the family has no fixed schema (clone-only)
pub fn ensure_table(conn: &Connection, table: &TableName) -> Result<Provisioned> {
    let ddl = family_ddl(table).ok_or_else(|| {
        Error::Validation(format!(
            "{} tables are cloned, not provisioned from a fixed schema",
            table.family()
        ))
    })?;

    let failed = |source: rusqlite::Error| Error::ProvisioningFailed {
        table: table.to_string(),
        source,
    };

    let existed = table_exists(conn, table.as_str()).map_err(failed)?;
    if !existed {
        conn.execute_batch(&ddl).map_err(failed)?;
    }

    if let Some(catalog) = family_catalog(table.family()) {
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES (?)",
            quote(catalog.table),
            quote(catalog.column)
        );
        let recorded = conn.execute(&sql, [table.key()]).map_err(failed)?;
        if recorded > 0 && existed {
            debug!(table = %table, catalog = catalog.table, "repaired missing catalog entry");
        }
    }

    if existed {
        debug!(table = %table, family = %table.family(), "table already exists");
        Ok(Provisioned::AlreadyExists)
    } else {
        info!(table = %table, family = %table.family(), "created table");
        Ok(Provisioned::Created)
    }
}

/// [`ensure_table`] inside its own `IMMEDIATE` transaction.
///
/// The write lock is taken before the existence check, so concurrent callers
/// serialize and exactly one of them reports `Created`.
pub fn ensure_table_atomic(conn: &mut Connection, table: &TableName) -> Result<Provisioned> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|source| Error::ProvisioningFailed {
            table: table.to_string(),
            source,
        })?;
    let outcome = ensure_table(&tx, table)?;
    tx.commit().map_err(|source| Error::ProvisioningFailed {
        table: table.to_string(),
        source,
    })?;
    Ok(outcome)
}

// =============================================================================
// Tests
// =============================================================================
