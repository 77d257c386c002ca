//! # Dual-Write Order Writer
//!
//! Writes an order batch to the global ledger (`ordenes`) and to the mesa's
//! mirror table (`orden_<mesa>`) in a single transaction.
//!
//! ## State Machine
//!
//! ```text
//! Begin ─► EnsureLedger ─► EnsureMirror ─► ClearMirror ─► InsertLedgerBatch ─► InsertMirrorBatch ─► Commit
//!   │           │               │               │                 │                   │               │
//!   └───────────┴───────────────┴───────────────┴─────────────────┴───────────────────┴───────────────┘
//!                                               │
//!                                               ▼
//!                                     Rollback (Transaction dropped)
//! ```
//!
//! The ledger is append-only and accumulates every batch ever submitted. The
//! mirror is cleared first, so it always holds exactly the latest batch.
//!
//! ## Rust Pattern: Drop-Based Rollback
//!
//! Each step returns a `Result` and is chained with `?`. The `Transaction`
//! rolls back in its `Drop` impl unless `commit()` ran, so every early return
//! takes the same cleanup path and no partial order state survives.

use std::fmt;

use rusqlite::{params_from_iter, Connection, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ident::{quote, Resolver, TableFamily, TableName};
use crate::ingest::MAX_BOUND_PARAMS;
use crate::provision::ensure_table;
use crate::schema::{table_exists, ORDER_LEDGER_COLUMNS, ORDER_MIRROR_COLUMNS};
use crate::types::{OrderBatch, OrderLine, OrderReceipt, Value};

// =============================================================================
// Stages
// =============================================================================

/// A step of an order transaction. Reported by `Error::TransactionAborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStage {
    Begin,
    EnsureLedger,
    EnsureMirror,
    ClearMirror,
    InsertLedgerBatch,
    InsertMirrorBatch,
    UpdateLedger,
    UpdateMirror,
    Commit,
}

impl OrderStage {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStage::Begin => "begin",
            OrderStage::EnsureLedger => "ensure-ledger",
            OrderStage::EnsureMirror => "ensure-mirror",
            OrderStage::ClearMirror => "clear-mirror",
            OrderStage::InsertLedgerBatch => "insert-ledger-batch",
            OrderStage::InsertMirrorBatch => "insert-mirror-batch",
            OrderStage::UpdateLedger => "update-ledger",
            OrderStage::UpdateMirror => "update-mirror",
            OrderStage::Commit => "commit",
        }
    }
}

impl fmt::Display for OrderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a store error raised at `stage` to `TransactionAborted`.
fn aborted_at(stage: OrderStage) -> impl Fn(rusqlite::Error) -> Error {
    move |source| {
        warn!(stage = %stage, error = %source, "order transaction rolled back");
        Error::TransactionAborted { stage, source }
    }
}

/// Provisioning inside the transaction reports its failure as the stage.
fn ensure_at(tx: &Transaction<'_>, table: &TableName, stage: OrderStage) -> Result<()> {
    match ensure_table(tx, table) {
        Ok(_) => Ok(()),
        Err(Error::ProvisioningFailed { source, .. }) => Err(aborted_at(stage)(source)),
        Err(other) => Err(other),
    }
}

// =============================================================================
// Batch Submission
// =============================================================================

/// Submits `batch` for its mesa.
///
/// # Errors
///
/// - `Error::Validation` if the batch is empty or mixes mesas
/// - `Error::InvalidIdentifier` if the mesa does not form a safe table name
/// - `Error::TransactionAborted` naming the failed stage; nothing was written
///
/// # Example
///
/// ```ignore
/// let batch = OrderBatch::new(vec![OrderLine::new(5, "Taco", 2, 30)]);
/// let receipt = submit_orders(&mut conn, &Resolver::default(), &batch)?;
/// assert_eq!(receipt.mirror_table, "orden_5");
/// ```
pub fn submit_orders(
    conn: &mut Connection,
    resolver: &Resolver,
    batch: &OrderBatch,
) -> Result<OrderReceipt> {
    let mesa = batch.mesa()?;
    let ledger = resolver.resolve(TableFamily::OrderLedger, &[])?;
    let mirror = resolver.resolve(TableFamily::OrderMirror, &[&mesa.to_string()])?;

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(aborted_at(OrderStage::Begin))?;

    ensure_at(&tx, &ledger, OrderStage::EnsureLedger)?;
    ensure_at(&tx, &mirror, OrderStage::EnsureMirror)?;

    let cleared = tx
        .execute(&format!("DELETE FROM {}", mirror.quoted()), [])
        .map_err(aborted_at(OrderStage::ClearMirror))?;
    debug!(mirror = %mirror, cleared, "mirror cleared");

    insert_lines(&tx, &ledger, ORDER_LEDGER_COLUMNS, &batch.lines, true)
        .map_err(aborted_at(OrderStage::InsertLedgerBatch))?;
    insert_lines(&tx, &mirror, ORDER_MIRROR_COLUMNS, &batch.lines, false)
        .map_err(aborted_at(OrderStage::InsertMirrorBatch))?;

    tx.commit().map_err(aborted_at(OrderStage::Commit))?;

    info!(mesa, lines = batch.len(), mirror = %mirror, "order batch committed");
    Ok(OrderReceipt {
        mesa,
        mirror_table: mirror.to_string(),
        rows_written: batch.len(),
    })
}

/// Adds one line to the ledger and to its mesa's mirror without clearing the
/// mirror first.
pub fn append_order_line(
    conn: &mut Connection,
    resolver: &Resolver,
    line: &OrderLine,
) -> Result<OrderReceipt> {
    let ledger = resolver.resolve(TableFamily::OrderLedger, &[])?;
    let mirror = resolver.resolve(TableFamily::OrderMirror, &[&line.mesa.to_string()])?;
    let lines = std::slice::from_ref(line);

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(aborted_at(OrderStage::Begin))?;

    ensure_at(&tx, &ledger, OrderStage::EnsureLedger)?;
    ensure_at(&tx, &mirror, OrderStage::EnsureMirror)?;

    insert_lines(&tx, &ledger, ORDER_LEDGER_COLUMNS, lines, true)
        .map_err(aborted_at(OrderStage::InsertLedgerBatch))?;
    insert_lines(&tx, &mirror, ORDER_MIRROR_COLUMNS, lines, false)
        .map_err(aborted_at(OrderStage::InsertMirrorBatch))?;

    tx.commit().map_err(aborted_at(OrderStage::Commit))?;

    debug!(mesa = line.mesa, producto = %line.producto, "order line appended");
    Ok(OrderReceipt {
        mesa: line.mesa,
        mirror_table: mirror.to_string(),
        rows_written: 1,
    })
}

/// Sets `cantidad` for `producto` in the ledger (rows of this mesa) and in the
/// mesa's mirror, in one transaction.
///
/// Returns the total number of rows changed across both tables.
///
/// # Errors
///
/// `Error::NotFound` if neither table had a matching row. Missing tables
/// count as zero matches.
pub fn update_order_quantity(
    conn: &mut Connection,
    resolver: &Resolver,
    mesa: i64,
    producto: &str,
    cantidad: i64,
) -> Result<usize> {
    let ledger = resolver.resolve(TableFamily::OrderLedger, &[])?;
    let mirror = resolver.resolve(TableFamily::OrderMirror, &[&mesa.to_string()])?;

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(aborted_at(OrderStage::Begin))?;

    let mut changed = 0;

    if table_exists(&tx, ledger.as_str()).map_err(aborted_at(OrderStage::UpdateLedger))? {
        changed += tx
            .execute(
                &format!(
                    "UPDATE {} SET cantidad = ? WHERE mesa = ? AND producto = ?",
                    ledger.quoted()
                ),
                rusqlite::params![cantidad, mesa, producto],
            )
            .map_err(aborted_at(OrderStage::UpdateLedger))?;
    }

    if table_exists(&tx, mirror.as_str()).map_err(aborted_at(OrderStage::UpdateMirror))? {
        changed += tx
            .execute(
                &format!("UPDATE {} SET cantidad = ? WHERE producto = ?", mirror.quoted()),
                rusqlite::params![cantidad, producto],
            )
            .map_err(aborted_at(OrderStage::UpdateMirror))?;
    }

    if changed == 0 {
        return Err(Error::NotFound {
            table: mirror.to_string(),
            key_column: "producto".to_string(),
            key: producto.to_string(),
        });
    }

    tx.commit().map_err(aborted_at(OrderStage::Commit))?;
    debug!(mesa, producto, cantidad, changed, "order quantity updated");
    Ok(changed)
}

/// Multi-row insert of `lines`, chunked under the bound-parameter limit.
fn insert_lines(
    tx: &Transaction<'_>,
    table: &TableName,
    columns: &[(&str, &str)],
    lines: &[OrderLine],
    with_mesa: bool,
) -> rusqlite::Result<usize> {
    let width = columns.len();
    let column_list = columns
        .iter()
        .map(|(name, _)| quote(name))
        .collect::<Vec<_>>()
        .join(", ");
    let tuple = format!("({})", vec!["?"; width].join(", "));

    let mut written = 0;
    for chunk in lines.chunks((MAX_BOUND_PARAMS / width).max(1)) {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table.quoted(),
            column_list,
            vec![tuple.as_str(); chunk.len()].join(", ")
        );
        let values = chunk.iter().flat_map(|line| line_values(line, with_mesa));
        written += tx.execute(&sql, params_from_iter(values))?;
    }
    Ok(written)
}

fn line_values(line: &OrderLine, with_mesa: bool) -> Vec<Value> {
    let mut values = Vec::with_capacity(6);
    if with_mesa {
        values.push(Value::from(line.mesa));
    }
    values.push(Value::from(line.producto.as_str()));
    values.push(Value::from(line.cantidad));
    values.push(Value::from(line.precio_unitario));
    values.push(Value::from(line.entregado.as_str()));
    values.push(Value::from(line.pagado.as_str()));
    values
}

// =============================================================================
// Tests
// =============================================================================
