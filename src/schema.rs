//! # SQLite Schema for Tablesmith
//!
//! This module holds the fixed column schema of every table family and the
//! database initialization logic.
//!
//! ## Table Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Schema Overview                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Catalogs (fixed)             Family tables (created on demand)         │
//! │  ┌───────────────────┐        ┌──────────────────────────────┐          │
//! │  │ bases_datos       │───────►│ baseDeDatos_<dataset>        │          │
//! │  │ bases_planograma  │───────►│ planograma_<name>            │          │
//! │  └───────────────────┘        │ <user>_<dataset>  (cloned)   │          │
//! │                               │ <user>_database   (links)    │          │
//! │  Live table (fixed)           │ inventory_<user>  (cloned)   │          │
//! │  ┌───────────────────┐        │ orden_<mesa>      (mirror)   │          │
//! │  │ data              │───────►│ ordenes           (ledger)   │          │
//! │  └───────────────────┘        └──────────────────────────────┘          │
//! │                                                                         │
//! │  Back office (fixed names, created on first write)                      │
//! │  categorias   productos   mesas   ventasHoy                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Type Mapping
//!
//! The schemas were first written for a server database. In SQLite they map
//! to `INTEGER PRIMARY KEY AUTOINCREMENT`, `TEXT`, `REAL` and `INTEGER`.
//!
//! ## Name Case
//!
//! SQLite treats table names without regard to ASCII case, so lookups in
//! `sqlite_master` and the catalog key columns compare with `COLLATE NOCASE`.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::ident::{quote, TableFamily, TableName};

// =============================================================================
// Schema Version
// =============================================================================

/// Current version of the fixed tables. Family tables are not versioned.
/// Version 2 made catalog and link keys case-insensitive.
const SCHEMA_VERSION: i32 = 2;

/// Holds the schema version of the file.
pub const METADATA_TABLE: &str = "tablesmith_metadata";

/// Name of the live inventory table that per-user inventories are cloned from.
pub const LIVE_TABLE: &str = "data";

/// Catalog value that marks a placeholder entry rather than a real dataset.
pub const CATALOG_SENTINEL: &str = "created";

// =============================================================================
// Family Column Schemas
// =============================================================================

/// Column definition: name and SQLite declared type.
pub type ColumnDef = (&'static str, &'static str);

const ID_COLUMN: &str = "id INTEGER PRIMARY KEY AUTOINCREMENT";

/// Dataset spreadsheets (`baseDeDatos_<dataset>`) and the live `data` table.
///
/// `rank` is the natural key used by keyed updates and deletes.
pub const DATASET_COLUMNS: &[ColumnDef] = &[
    ("marca", "TEXT"),
    ("rank", "TEXT"),
    ("presentacion", "TEXT"),
    ("distribucion_tiendas", "TEXT"),
    ("frentes", "TEXT"),
    ("vol_ytd", "REAL"),
    ("ccc", "TEXT"),
    ("peakday_units", "REAL"),
    ("facings_minimos_pd", "REAL"),
    ("ros", "REAL"),
    ("avail3m", "REAL"),
    ("avail_plaza_oxxo", "REAL"),
    ("volume_mix", "TEXT"),
    ("industry_packtype", "TEXT"),
    ("percent_availab", "REAL"),
    ("mix_ros", "REAL"),
    ("atw", "REAL"),
    ("ajustes_frentes_minimos", "REAL"),
];

/// Planogram spreadsheets (`planograma_<name>`). `frente` is the natural key.
pub const PLANOGRAM_COLUMNS: &[ColumnDef] = &[
    ("frente", "REAL"),
    ("datos_planograma", "REAL"),
    ("frentes_totales", "REAL"),
    ("parrillas", "REAL"),
    ("planograma", "REAL"),
    ("skus", "REAL"),
    ("volumen", "REAL"),
    ("parrillas_admin", "REAL"),
    ("degradado", "REAL"),
    ("espacio", "REAL"),
];

/// Per-user link registry (`<user>_database`).
///
/// `database` is unique so re-linking the same dataset is a no-op.
pub const TENANT_LINK_COLUMNS: &[ColumnDef] = &[
    ("database", "TEXT NOT NULL UNIQUE COLLATE NOCASE"),
    ("planograma", "TEXT"),
];

/// Per-mesa mirror (`orden_<mesa>`).
pub const ORDER_MIRROR_COLUMNS: &[ColumnDef] = &[
    ("producto", "TEXT NOT NULL"),
    ("cantidad", "INTEGER NOT NULL"),
    ("precioUnitario", "INTEGER NOT NULL"),
    ("entregado", "TEXT NOT NULL"),
    ("pagado", "TEXT NOT NULL"),
];

/// Global order ledger (`ordenes`): the mirror columns plus the mesa.
pub const ORDER_LEDGER_COLUMNS: &[ColumnDef] = &[
    ("mesa", "INTEGER NOT NULL"),
    ("producto", "TEXT NOT NULL"),
    ("cantidad", "INTEGER NOT NULL"),
    ("precioUnitario", "INTEGER NOT NULL"),
    ("entregado", "TEXT NOT NULL"),
    ("pagado", "TEXT NOT NULL"),
];

/// Menu categories (`categorias`).
pub const CATEGORY_COLUMNS: &[ColumnDef] = &[("categoria", "TEXT NOT NULL")];

/// Menu products (`productos`). Only `estado = 'activo'` rows are listed to
/// customers.
pub const PRODUCT_COLUMNS: &[ColumnDef] = &[
    ("nombre", "TEXT NOT NULL"),
    ("precio", "INTEGER NOT NULL"),
    ("categoria", "TEXT NOT NULL"),
    ("estado", "TEXT NOT NULL"),
];

/// Registered mesas (`mesas`).
pub const MESA_COLUMNS: &[ColumnDef] = &[
    ("mesa", "INTEGER NOT NULL"),
    ("estado", "TEXT NOT NULL"),
];

/// Payments taken today (`ventasHoy`). Amounts are whole currency units.
pub const PAYMENT_COLUMNS: &[ColumnDef] = &[
    ("metodoPago", "INTEGER NOT NULL"),
    ("totalVenta", "INTEGER NOT NULL"),
    ("descuentoTotal", "INTEGER NOT NULL"),
    ("propina", "INTEGER NOT NULL"),
    ("montoPagado", "INTEGER NOT NULL"),
    ("cambioDevuelto", "INTEGER NOT NULL"),
];

/// Returns the fixed columns of `family`, or `None` for families whose
/// structure is copied from a master table.
pub fn family_columns(family: TableFamily) -> Option<&'static [ColumnDef]> {
    match family {
        TableFamily::Dataset => Some(DATASET_COLUMNS),
        TableFamily::Planogram => Some(PLANOGRAM_COLUMNS),
        TableFamily::TenantLinks => Some(TENANT_LINK_COLUMNS),
        TableFamily::OrderMirror => Some(ORDER_MIRROR_COLUMNS),
        TableFamily::OrderLedger => Some(ORDER_LEDGER_COLUMNS),
        TableFamily::Categories => Some(CATEGORY_COLUMNS),
        TableFamily::Products => Some(PRODUCT_COLUMNS),
        TableFamily::Mesas => Some(MESA_COLUMNS),
        TableFamily::Payments => Some(PAYMENT_COLUMNS),
        TableFamily::UserDatasetCopy | TableFamily::Inventory => None,
    }
}

/// Natural key column used to address single rows of a family's tables.
pub fn natural_key(family: TableFamily) -> Option<&'static str> {
    match family {
        TableFamily::Dataset | TableFamily::UserDatasetCopy | TableFamily::Inventory => {
            Some("rank")
        }
        TableFamily::Planogram => Some("frente"),
        _ => None,
    }
}

/// Builds an idempotent `CREATE TABLE IF NOT EXISTS` for a column list.
pub fn create_table_sql(table: &str, columns: &[ColumnDef]) -> String {
    let mut defs = Vec::with_capacity(columns.len() + 1);
    defs.push(ID_COLUMN.to_string());
    defs.extend(
        columns
            .iter()
            .map(|(name, ty)| format!("{} {}", quote(name), ty)),
    );
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote(table),
        defs.join(",\n    ")
    )
}

/// DDL for a resolved family table, or `None` if the family is clone-only.
pub fn family_ddl(table: &TableName) -> Option<String> {
    family_columns(table.family()).map(|cols| create_table_sql(table.as_str(), cols))
}

// =============================================================================
// Catalogs
// =============================================================================

/// A family-level registry table recording which keys were provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Catalog {
    pub table: &'static str,
    pub column: &'static str,
}

/// `bases_datos`: one row per provisioned dataset key.
pub const DATASET_CATALOG: Catalog = Catalog {
    table: "bases_datos",
    column: "nombre_base_datos",
};

/// `bases_planograma`: one row per provisioned planogram key.
pub const PLANOGRAM_CATALOG: Catalog = Catalog {
    table: "bases_planograma",
    column: "nombre_planograma",
};

/// The catalog a family records its keys in, if any.
pub fn family_catalog(family: TableFamily) -> Option<Catalog> {
    match family {
        TableFamily::Dataset => Some(DATASET_CATALOG),
        TableFamily::Planogram => Some(PLANOGRAM_CATALOG),
        _ => None,
    }
}

impl Catalog {
    fn ddl(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {},\n    {} TEXT NOT NULL UNIQUE COLLATE NOCASE\n)",
            quote(self.table),
            ID_COLUMN,
            quote(self.column)
        )
    }
}

fn metadata_ddl() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {METADATA_TABLE} (\n    key   TEXT PRIMARY KEY,\n    value TEXT NOT NULL\n)"
    )
}

// =============================================================================
// Helpers
// =============================================================================

/// Returns true if a table named `name` exists, ignoring ASCII case the way
/// SQLite resolves table names.
///
/// The name is bound as a parameter, never interpolated.
pub fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE)",
        [name],
        |row| row.get(0),
    )
}

/// Applies per-connection settings. Every pooled connection goes through this.
pub fn configure_connection(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON")?;
    Ok(())
}

// =============================================================================
// Database Wrapper
// =============================================================================

/// A SQLite connection with the fixed Tablesmith tables in place.
///
/// # Ownership
///
/// `Database` owns its `Connection`; dropping it closes the connection.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database file, creating and initializing it if necessary.
    ///
    /// # Errors
    ///
    /// - `Error::Sqlite` if the file can't be opened or created
    /// - `Error::Schema` if the file was written by an incompatible version
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Creates an in-memory database for unit tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Creates the fixed tables. Safe to run on every open.
    fn initialize(&mut self) -> Result<()> {
        // WAL lets pooled readers proceed while another connection writes.
        // journal_mode answers with the resulting mode, hence the checked form.
        self.conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        self.conn.execute_batch("PRAGMA synchronous = NORMAL")?;
        self.conn.execute_batch("PRAGMA foreign_keys = ON")?;

        self.conn.execute_batch(&metadata_ddl())?;
        self.conn.execute_batch(&DATASET_CATALOG.ddl())?;
        self.conn.execute_batch(&PLANOGRAM_CATALOG.ddl())?;
        self.conn
            .execute_batch(&create_table_sql(LIVE_TABLE, DATASET_COLUMNS))?;

        self.verify_or_set_version()
    }

    fn verify_or_set_version(&mut self) -> Result<()> {
        let existing: Option<String> = match self.conn.query_row(
            "SELECT value FROM tablesmith_metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        ) {
            Ok(v) => Some(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        match existing {
            None => {
                self.conn.execute(
                    "INSERT INTO tablesmith_metadata (key, value) VALUES ('schema_version', ?)",
                    [SCHEMA_VERSION.to_string()],
                )?;
            }
            Some(v) if v == SCHEMA_VERSION.to_string() => {}
            Some(v) => {
                return Err(Error::Schema(format!(
                    "schema version mismatch: database has version {v}, but this build requires {SCHEMA_VERSION}"
                )));
            }
        }

        Ok(())
    }

    /// Borrows the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Mutably borrows the underlying connection (transactions need `&mut`).
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Consumes the wrapper and returns the connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

// =============================================================================
// Tests
// =============================================================================
