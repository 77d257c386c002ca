//! # Table Cloner
//!
//! Copies a master table's structure and rows into a derived per-user table.
//!
//! ## Clone Once, Link Every Time
//!
//! ```text
//! link_dataset(ana, abc)
//!
//!   ana_abc exists? ──no──► CREATE (structure of baseDeDatos_abc)
//!        │                  INSERT INTO ana_abc SELECT * FROM baseDeDatos_abc
//!        │                          │
//!        └─yes──────────────────────┤
//!                                   ▼
//!                    ensure ana_database, INSERT OR IGNORE link row
//! ```
//!
//! An existing copy is never refreshed. Once cloned, a user's copy keeps the
//! rows it had at clone time even if the master changes afterwards. The link
//! row is recorded on every call and is unique per dataset, so repeated calls
//! leave one link.
//!
//! Inventory copies are the exception: [`refresh_inventory`] drops and
//! re-clones the user's copy of the live table on every call.
//!
//! ## "Create Like" in SQLite
//!
//! SQLite has no `CREATE TABLE ... LIKE`. The cloner reads the master's stored
//! DDL from `sqlite_master` and re-issues its column definitions under the
//! destination name.

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ident::{quote, validate_identifier, Resolver, TableFamily, TableName};
use crate::provision::ensure_table;
use crate::schema::{table_exists, LIVE_TABLE};
use crate::types::CloneOutcome;

/// Copies `source` into `dest` unless `dest` already exists.
///
/// Runs on the caller's transaction state.
///
/// # Errors
///
/// - `Error::InvalidIdentifier` if `source` is not a safe identifier
/// - `Error::CloneFailed` if the source is missing or any copy step fails
pub fn clone_table(conn: &Connection, source: &str, dest: &TableName) -> Result<CloneOutcome> {
    validate_identifier(source)?;

    let failed = |e: rusqlite::Error| Error::CloneFailed {
        source_table: source.to_string(),
        dest_table: dest.to_string(),
        source: e,
    };

    if table_exists(conn, dest.as_str()).map_err(failed)? {
        debug!(source, dest = %dest, "destination exists; clone skipped");
        return Ok(CloneOutcome::AlreadyLinked);
    }

    let source_ddl: String = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE",
            [source],
            |row| row.get(0),
        )
        .map_err(failed)?;

    let columns = source_ddl
        .find('(')
        .map(|at| &source_ddl[at..])
        .ok_or_else(|| failed(rusqlite::Error::InvalidQuery))?;

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} {}",
        dest.quoted(),
        columns
    ))
    .map_err(failed)?;

    let rows_copied = conn
        .execute(
            &format!("INSERT INTO {} SELECT * FROM {}", dest.quoted(), quote(source)),
            [],
        )
        .map_err(failed)?;

    info!(source, dest = %dest, rows_copied, "cloned table");
    Ok(CloneOutcome::Cloned { rows_copied })
}

/// Clones dataset `dataset` into `<username>_<dataset>` and records the link
/// in `<username>_database`, all in one transaction.
///
/// Returns `Cloned` the first time and `AlreadyLinked` afterwards.
pub fn link_dataset(
    conn: &mut Connection,
    resolver: &Resolver,
    username: &str,
    dataset: &str,
) -> Result<CloneOutcome> {
    let source = resolver.resolve(TableFamily::Dataset, &[dataset])?;
    let dest = resolver.resolve(TableFamily::UserDatasetCopy, &[username, dataset])?;
    let links = resolver.resolve(TableFamily::TenantLinks, &[username])?;

    let failed = |e: rusqlite::Error| Error::CloneFailed {
        source_table: source.to_string(),
        dest_table: dest.to_string(),
        source: e,
    };

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(failed)?;

    let outcome = clone_table(&tx, source.as_str(), &dest)?;

    ensure_table(&tx, &links)?;
    let linked = tx
        .execute(
            &format!(
                "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?, ?)",
                links.quoted(),
                quote("database"),
                quote("planograma")
            ),
            [dataset, dataset],
        )
        .map_err(failed)?;

    tx.commit().map_err(failed)?;

    debug!(username, dataset, new_link = linked > 0, "dataset linked");
    Ok(outcome)
}

/// Replaces `inventory_<username>` with a fresh copy of the live table.
///
/// Returns the copied table name and how many rows it holds.
pub fn refresh_inventory(
    conn: &mut Connection,
    resolver: &Resolver,
    username: &str,
) -> Result<(TableName, usize)> {
    let dest = resolver.resolve(TableFamily::Inventory, &[username])?;

    let failed = |e: rusqlite::Error| Error::CloneFailed {
        source_table: LIVE_TABLE.to_string(),
        dest_table: dest.to_string(),
        source: e,
    };

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(failed)?;
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", dest.quoted()))
        .map_err(failed)?;

    let rows = match clone_table(&tx, LIVE_TABLE, &dest)? {
        CloneOutcome::Cloned { rows_copied } => rows_copied,
        // The table was dropped above inside this same transaction.
        CloneOutcome::AlreadyLinked => 0,
    };
    tx.commit().map_err(failed)?;

    Ok((dest, rows))
}

// =============================================================================
// Tests
// =============================================================================
