//! # Tablesmith - Dynamic Table Engine
//!
//! Tablesmith manages relational tables that are created at runtime from
//! user-supplied names. It provides:
//!
//! - **Safe table naming**: every dynamic identifier passes an allow-list
//! - **Idempotent provisioning**: create-if-absent with a family catalog
//! - **Spreadsheet ingestion**: full replace of a table from a header + rows grid
//! - **Per-user copies**: clone a master table once, link it every time
//! - **Order dual-writes**: ledger and per-mesa mirror in one transaction
//! - **Back office**: menu categories and products, mesas, today's payments
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Async API Layer                          │
//! │          (Tablesmith: one pooled connection per call)           │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Identifier Resolver                         │
//! │            (TableFamily + key tokens ─► TableName)              │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!          ┌──────────────┬─────┴────────┬──────────────┐
//!          ▼              ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │  Ingestor  │ │   Cloner   │ │   Orders   │ │ Reader /   │
//!   │            │ │            │ │ dual-write │ │ Mutate     │
//!   └─────┬──────┘ └─────┬──────┘ └─────┬──────┘ └────────────┘
//!         └──────────────┼──────────────┘
//!                        ▼
//!              ┌───────────────────┐
//!              │    Provisioner    │
//!              │ (create if absent │
//!              │  + catalog entry) │
//!              └─────────┬─────────┘
//!                        ▼
//!              ┌───────────────────┐
//!              │   SQLite (WAL)    │
//!              └───────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **No raw identifiers**: a table or column name reaches SQL text only
//!    after validation, and always double-quoted
//! 2. **Catalog follows tables**: a dataset or planogram key is catalogued
//!    exactly once, and only if its table exists
//! 3. **Replace, never merge**: ingestion leaves exactly the grid's rows
//! 4. **Mirror = latest batch**: `orden_<mesa>` holds the last submitted
//!    batch while `ordenes` accumulates every batch
//! 5. **Release once**: every pooled connection returns to the pool exactly
//!    once, rolled back if a transaction was left open
//!
//! ## Module Organization
//!
//! - [`error`]: Error type for all failure modes
//! - [`config`]: Runtime settings and environment loading
//! - [`ident`]: Table families, naming templates and identifier validation
//! - [`schema`]: Fixed column schemas and database initialization
//! - [`types`]: Values, rows, grids, orders and operation outcomes
//! - [`provision`]: Create-if-absent with catalog bookkeeping
//! - [`ingest`]: Spreadsheet ingestion (atomic and per-row)
//! - [`cloner`]: Per-user table copies and inventory refresh
//! - [`orders`]: Ledger + mirror dual-write
//! - [`backoffice`]: Categories, products, mesas and payments
//! - [`reader`]: Table, column, catalog and order reads
//! - [`mutate`]: Keyed row update and delete
//! - [`grid`]: Spreadsheet sources (CSV)
//! - [`pool`]: Bounded connection pool
//! - [`api`]: Async API (main entry point)

// =============================================================================
// Module Declarations
// =============================================================================

/// Error types for Tablesmith operations.
///
/// One enum covers every component, so callers match on a single type.
pub mod error;

/// Runtime configuration.
pub mod config;

/// Identifier Resolver.
///
/// Composes table names from a family and user-supplied tokens. This is the
/// only place request input turns into SQL identifiers.
pub mod ident;

/// SQLite schema definitions and database initialization.
pub mod schema;

/// Domain types: cell values, rows, spreadsheet grids and order lines.
pub mod types;

/// Schema Registry Provisioner.
///
/// Ensures a family table exists before use and records its key in the
/// family catalog.
pub mod provision;

/// Bulk Ingestor.
///
/// Replaces a table's contents with the data rows of a spreadsheet grid,
/// either in one transaction or row by row.
pub mod ingest;

/// Table Cloner.
pub mod cloner;

/// Dual-Write Order Writer.
///
/// Submits order batches to the global ledger and the per-mesa mirror in a
/// single transaction. Any failing step rolls everything back.
pub mod orders;

/// Fixed-name back-office tables.
pub mod backoffice;

/// Read operations over dynamically named tables.
pub mod reader;

/// Keyed update and delete by natural key.
pub mod mutate;

/// Spreadsheet sources.
pub mod grid;

/// Bounded connection pool with RAII release.
pub mod pool;

/// Async API for Tablesmith.
///
/// The main entry point is [`Tablesmith`](api::Tablesmith).
pub mod api;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::Tablesmith;
pub use config::Config;
pub use error::{Error, Result};
pub use grid::{CsvGridSource, GridSource};
pub use ident::{resolve, Resolver, TableFamily, TableName};
pub use ingest::IngestMode;
pub use orders::OrderStage;
pub use pool::{Pool, PoolStatus, PooledConnection};
pub use reader::TenantLink;
pub use schema::Database;

pub use types::{
    CloneOutcome, IngestReport, OrderBatch, OrderLine, OrderReceipt, Payment, Product,
    Provisioned, Row, SpreadsheetGrid, Value,
};
