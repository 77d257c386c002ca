//! # Table Reader
//!
//! Read paths over dynamically named tables: whole tables, single projected
//! columns, catalogs, tenant links and the order tables.
//!
//! All reads are plain `SELECT`s on the caller's connection. A table that was
//! never provisioned reads as empty rather than as an error, so a dashboard
//! asking for a mesa that never ordered gets no rows.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ident::{quote, validate_identifier, Resolver, TableFamily, TableName};
use crate::schema::{table_exists, CATALOG_SENTINEL, DATASET_CATALOG, PLANOGRAM_CATALOG};
use crate::types::{Row, Value};

/// One row of a `<username>_database` link table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantLink {
    pub database: String,
    pub planograma: Option<String>,
}

/// Reads every row of `table` in insertion order.
pub fn read_all(conn: &Connection, table: &TableName) -> Result<Vec<Row>> {
    if !table_exists(conn, table.as_str())? {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", table.quoted()))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let rows = stmt.query_map([], |row| {
        columns
            .iter()
            .enumerate()
            .map(|(i, name)| Ok((name.clone(), row.get::<_, Value>(i)?)))
            .collect::<rusqlite::Result<Row>>()
    })?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Reads a single column of `table`, e.g. `frentes_totales` of a planogram.
///
/// # Errors
///
/// - `Error::InvalidIdentifier` for an unsafe column name
/// - `Error::Sqlite` if the column does not exist
pub fn read_column(conn: &Connection, table: &TableName, column: &str) -> Result<Vec<Value>> {
    validate_identifier(column)?;
    if !table_exists(conn, table.as_str())? {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} ORDER BY rowid",
        quote(column),
        table.quoted()
    ))?;
    let values = stmt.query_map([], |row| row.get::<_, Value>(0))?;
    Ok(values.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn catalog_keys(conn: &Connection, table: &str, column: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {col} FROM {table} WHERE {col} <> ? ORDER BY id",
        col = quote(column),
        table = quote(table)
    ))?;
    let keys = stmt.query_map([CATALOG_SENTINEL], |row| row.get(0))?;
    Ok(keys.collect::<rusqlite::Result<Vec<String>>>()?)
}

/// Dataset keys recorded in `bases_datos`, oldest first.
pub fn list_datasets(conn: &Connection) -> Result<Vec<String>> {
    catalog_keys(conn, DATASET_CATALOG.table, DATASET_CATALOG.column)
}

/// Planogram keys recorded in `bases_planograma`, oldest first.
pub fn list_planograms(conn: &Connection) -> Result<Vec<String>> {
    catalog_keys(conn, PLANOGRAM_CATALOG.table, PLANOGRAM_CATALOG.column)
}

/// Datasets linked to `username`.
pub fn list_tenant_links(
    conn: &Connection,
    resolver: &Resolver,
    username: &str,
) -> Result<Vec<TenantLink>> {
    let links = resolver.resolve(TableFamily::TenantLinks, &[username])?;
    if !table_exists(conn, links.as_str())? {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {}, {} FROM {} ORDER BY id",
        quote("database"),
        quote("planograma"),
        links.quoted()
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok(TenantLink {
            database: row.get(0)?,
            planograma: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Every ledger row across all mesas.
pub fn read_ledger(conn: &Connection, resolver: &Resolver) -> Result<Vec<Row>> {
    read_all(conn, &resolver.resolve(TableFamily::OrderLedger, &[])?)
}

/// The latest batch submitted for `mesa`.
pub fn read_mirror(conn: &Connection, resolver: &Resolver, mesa: i64) -> Result<Vec<Row>> {
    read_all(conn, &resolver.resolve(TableFamily::OrderMirror, &[&mesa.to_string()])?)
}

// =============================================================================
// Tests
// =============================================================================
