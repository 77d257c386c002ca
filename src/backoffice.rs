//! # Back Office Tables
//!
//! Menu categories, products, mesas and today's payments. Each lives in one
//! fixed-name table that is provisioned on its first write:
//!
//! ```text
//! categorias   (categoria)
//! productos    (nombre, precio, categoria, estado)
//! mesas        (mesa, estado)
//! ventasHoy    (metodoPago, totalVenta, descuentoTotal, propina,
//!               montoPagado, cambioDevuelto)
//! ```
//!
//! Writes provision and insert inside one `IMMEDIATE` transaction and return
//! the new row id. Reads of a table that was never written return no rows.

use rusqlite::{params_from_iter, Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ident::{quote, Resolver, TableFamily, TableName};
use crate::provision::ensure_table;
use crate::reader::read_all;
use crate::schema::{family_columns, table_exists, MESA_COLUMNS, PAYMENT_COLUMNS};
use crate::types::{Payment, Product, Row, Value, PRODUCT_ACTIVE};

// =============================================================================
// Categories
// =============================================================================

pub fn add_category(conn: &mut Connection, resolver: &Resolver, categoria: &str) -> Result<i64> {
    require_text("categoria", categoria)?;
    let table = resolver.resolve(TableFamily::Categories, &[])?;
    insert_row(conn, &table, vec![Value::from(categoria)])
}

pub fn list_categories(conn: &Connection, resolver: &Resolver) -> Result<Vec<Row>> {
    read_all(conn, &resolver.resolve(TableFamily::Categories, &[])?)
}

// =============================================================================
// Products
// =============================================================================

/// # Errors
///
/// `Error::Validation` for an empty text field or a negative price.
pub fn add_product(conn: &mut Connection, resolver: &Resolver, product: &Product) -> Result<i64> {
    require_text("nombre", &product.nombre)?;
    require_text("categoria", &product.categoria)?;
    require_text("estado", &product.estado)?;
    require_amount("precio", product.precio)?;

    let table = resolver.resolve(TableFamily::Products, &[])?;
    insert_row(
        conn,
        &table,
        vec![
            Value::from(product.nombre.as_str()),
            Value::from(product.precio),
            Value::from(product.categoria.as_str()),
            Value::from(product.estado.as_str()),
        ],
    )
}

/// Products of `categoria` that are `activo`, in insertion order.
pub fn list_active_products(
    conn: &Connection,
    resolver: &Resolver,
    categoria: &str,
) -> Result<Vec<Row>> {
    let table = resolver.resolve(TableFamily::Products, &[])?;
    if !table_exists(conn, table.as_str())? {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM {} WHERE estado = ? AND categoria = ? ORDER BY rowid",
        table.quoted()
    ))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let rows = stmt.query_map([PRODUCT_ACTIVE, categoria], |row| {
        columns
            .iter()
            .enumerate()
            .map(|(i, name)| Ok((name.clone(), row.get::<_, Value>(i)?)))
            .collect::<rusqlite::Result<Row>>()
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// =============================================================================
// Mesas
// =============================================================================

pub fn add_mesa(conn: &mut Connection, resolver: &Resolver, mesa: i64, estado: &str) -> Result<i64> {
    require_text("estado", estado)?;
    let table = resolver.resolve(TableFamily::Mesas, &[])?;
    insert_row(conn, &table, vec![Value::from(mesa), Value::from(estado)])
}

pub fn list_mesas(conn: &Connection, resolver: &Resolver) -> Result<Vec<Row>> {
    read_all(conn, &resolver.resolve(TableFamily::Mesas, &[])?)
}

/// Sets `mesa` and `estado` of the row with id `id`.
///
/// # Errors
///
/// `Error::NotFound` if no row has that id, including when no mesa was ever
/// registered.
pub fn update_mesa(
    conn: &Connection,
    resolver: &Resolver,
    id: i64,
    mesa: i64,
    estado: &str,
) -> Result<usize> {
    require_text("estado", estado)?;
    let table = resolver.resolve(TableFamily::Mesas, &[])?;

    let changed = if table_exists(conn, table.as_str())? {
        conn.execute(
            &format!(
                "UPDATE {} SET {} = ?, {} = ? WHERE id = ?",
                table.quoted(),
                quote(MESA_COLUMNS[0].0),
                quote(MESA_COLUMNS[1].0)
            ),
            rusqlite::params![mesa, estado, id],
        )?
    } else {
        0
    };

    if changed == 0 {
        return Err(Error::NotFound {
            table: table.to_string(),
            key_column: "id".to_string(),
            key: id.to_string(),
        });
    }
    debug!(id, mesa, estado, "mesa updated");
    Ok(changed)
}

// =============================================================================
// Payments
// =============================================================================

/// # Errors
///
/// `Error::Validation` if any amount is negative.
pub fn record_payment(conn: &mut Connection, resolver: &Resolver, payment: &Payment) -> Result<i64> {
    for ((column, _), amount) in PAYMENT_COLUMNS.iter().zip(payment.values()) {
        require_amount(column, amount)?;
    }
    let table = resolver.resolve(TableFamily::Payments, &[])?;
    insert_row(conn, &table, payment.values().into_iter().map(Value::from).collect())
}

pub fn list_payments(conn: &Connection, resolver: &Resolver) -> Result<Vec<Row>> {
    read_all(conn, &resolver.resolve(TableFamily::Payments, &[])?)
}

// =============================================================================
// Helpers
// =============================================================================

/// Provisions `table` and inserts one row of `values` in its family's column
/// order, in one transaction. Returns the new id.
fn insert_row(conn: &mut Connection, table: &TableName, values: Vec<Value>) -> Result<i64> {
    let columns = family_columns(table.family()).ok_or_else(|| {
        Error::Validation(format!("{} has no fixed columns", table.family()))
    })?;
    debug_assert_eq!(columns.len(), values.len());

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_table(&tx, table)?;

    let column_list = columns
        .iter()
        .map(|(name, _)| quote(name))
        .collect::<Vec<_>>()
        .join(", ");
    tx.execute(
        &format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.quoted(),
            column_list,
            vec!["?"; columns.len()].join(", ")
        ),
        params_from_iter(values),
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    info!(table = %table, id, "row added");
    Ok(id)
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_amount(field: &str, value: i64) -> Result<()> {
    if value < 0 {
        return Err(Error::Validation(format!("{field} must not be negative")));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
