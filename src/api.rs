//! # Async API for Tablesmith
//!
//! [`Tablesmith`] is the handle request handlers hold. Each operation checks
//! out one pooled connection, runs the synchronous component on the blocking
//! thread pool, and releases the connection when the component returns.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Async Tasks (requests)                   │
//! │   ingest_dataset   link_dataset   submit_orders   read_...    │
//! └──────────────┬───────────────────────────────────────────────┘
//!                │ resolve table names (pure, on the async side)
//!                ▼
//!        ┌───────────────┐   waits when all connections are out
//!        │     Pool      │◄──────────────────────────────────────
//!        └───────┬───────┘
//!                │ spawn_blocking(component(&mut conn))
//!                ▼
//!   provision / ingest / cloner / orders / backoffice / reader / mutate
//!                │
//!                ▼
//!           SQLite (WAL)
//! ```
//!
//! Names are resolved before a connection is taken, so an unsafe token is
//! rejected without touching the pool.
//!
//! ## Rust Concepts
//!
//! - **spawn_blocking**: run synchronous rusqlite work off the async workers
//! - **`'static` closures**: everything a blocking task needs is moved in,
//!   hence the owned `TableName`s and `String`s below

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::backoffice;
use crate::cloner;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::grid::{CsvGridSource, GridSource};
use crate::ident::{Resolver, TableFamily, TableName};
use crate::ingest::{self, IngestMode};
use crate::mutate;
use crate::orders;
use crate::pool::{Pool, PoolStatus};
use crate::reader::{self, TenantLink};
use crate::schema::Database;
use crate::types::{
    CloneOutcome, IngestReport, OrderBatch, OrderLine, OrderReceipt, Payment, Product, Row,
    SpreadsheetGrid, Value,
};

/// The main async handle for Tablesmith operations.
///
/// # Thread Safety
///
/// `Tablesmith` is `Clone`, `Send` and `Sync`. Clones share one pool.
///
/// # Example
///
/// ```rust,ignore
/// use tablesmith::{Config, OrderBatch, OrderLine, Tablesmith};
///
/// #[tokio::main]
/// async fn main() -> tablesmith::Result<()> {
///     let store = Tablesmith::open(Config::new("shop.db")).await?;
///
///     let batch = OrderBatch::new(vec![OrderLine::new(5, "Taco", 2, 30)]);
///     let receipt = store.submit_orders(batch).await?;
///     println!("mirror {} holds {} rows", receipt.mirror_table, receipt.rows_written);
///
///     store.close();
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Tablesmith {
    pool: Pool,
    resolver: Resolver,
    ingest_mode: IngestMode,
    grids: Arc<dyn GridSource>,
}

impl std::fmt::Debug for Tablesmith {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tablesmith")
            .field("pool", &self.pool)
            .field("resolver", &self.resolver)
            .field("ingest_mode", &self.ingest_mode)
            .finish_non_exhaustive()
    }
}

impl Tablesmith {
    /// Opens or creates the database in `config` and builds the pool.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if `config` is invalid
    /// - `Error::Schema` if the file was written by an incompatible version
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let path = config.database_path.clone();
        tokio::task::spawn_blocking(move || Database::open(path).map(drop))
            .await
            .map_err(|e| Error::Pool(format!("initialization task failed: {e}")))??;

        let pool = Pool::open(
            config.database_path.clone(),
            config.pool_size,
            config.busy_timeout,
        )?;
        info!(
            path = %config.database_path.display(),
            pool_size = config.pool_size,
            ingest_mode = config.ingest_mode.as_str(),
            "tablesmith opened"
        );
        Ok(Self::with_pool(pool, &config))
    }

    /// Builds a handle over an existing pool whose connections already see
    /// an initialized database.
    pub fn with_pool(pool: Pool, config: &Config) -> Self {
        Self {
            pool,
            resolver: Resolver::new(config.max_identifier_len),
            ingest_mode: config.ingest_mode,
            grids: Arc::new(CsvGridSource::default()),
        }
    }

    /// Replaces the spreadsheet reader used by [`Tablesmith::ingest_file`].
    pub fn with_grid_source(mut self, grids: impl GridSource + 'static) -> Self {
        self.grids = Arc::new(grids);
        self
    }

    /// Resolves a table name with this handle's identifier limit.
    pub fn table(&self, family: TableFamily, parts: &[&str]) -> Result<TableName> {
        self.resolver.resolve(family, parts)
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Stops handing out connections. In-flight operations finish normally.
    pub fn close(&self) {
        self.pool.close();
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Provisions `baseDeDatos_<dataset>` and replaces its contents.
    pub async fn ingest_dataset(&self, dataset: &str, grid: SpreadsheetGrid) -> Result<IngestReport> {
        let table = self.table(TableFamily::Dataset, &[dataset])?;
        self.ingest_into(table, grid).await
    }

    /// Provisions `planograma_<name>` and replaces its contents.
    pub async fn ingest_planogram(&self, name: &str, grid: SpreadsheetGrid) -> Result<IngestReport> {
        let table = self.table(TableFamily::Planogram, &[name])?;
        self.ingest_into(table, grid).await
    }

    /// Reads an uploaded file through the grid source, then ingests it into
    /// the dataset or planogram table named by `key`.
    pub async fn ingest_file(
        &self,
        family: TableFamily,
        key: &str,
        path: impl Into<PathBuf>,
    ) -> Result<IngestReport> {
        if !matches!(family, TableFamily::Dataset | TableFamily::Planogram) {
            return Err(Error::Validation(format!(
                "spreadsheets are ingested into dataset or planogram tables, not {family}"
            )));
        }
        let table = self.table(family, &[key])?;
        let grids = Arc::clone(&self.grids);
        let path = path.into();
        let grid = tokio::task::spawn_blocking(move || grids.read_grid(&path))
            .await
            .map_err(|e| Error::Pool(format!("grid task failed: {e}")))??;
        self.ingest_into(table, grid).await
    }

    async fn ingest_into(&self, table: TableName, grid: SpreadsheetGrid) -> Result<IngestReport> {
        let mode = self.ingest_mode;
        self.pool
            .run(move |conn| ingest::provision_and_ingest(conn, &table, &grid, mode))
            .await
    }

    // =========================================================================
    // Cloning
    // =========================================================================

    /// Gives `username` a private copy of `dataset` and records the link.
    pub async fn link_dataset(&self, username: &str, dataset: &str) -> Result<CloneOutcome> {
        // Validate up front so bad tokens never take a connection.
        self.table(TableFamily::UserDatasetCopy, &[username, dataset])?;
        let resolver = self.resolver;
        let (username, dataset) = (username.to_string(), dataset.to_string());
        self.pool
            .run(move |conn| cloner::link_dataset(conn, &resolver, &username, &dataset))
            .await
    }

    /// Re-copies the live table into `inventory_<username>` and returns it.
    pub async fn refresh_inventory(&self, username: &str) -> Result<Vec<Row>> {
        self.table(TableFamily::Inventory, &[username])?;
        let resolver = self.resolver;
        let username = username.to_string();
        self.pool
            .run(move |conn| {
                let (table, _) = cloner::refresh_inventory(conn, &resolver, &username)?;
                reader::read_all(conn, &table)
            })
            .await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn read_all(&self, table: TableName) -> Result<Vec<Row>> {
        self.pool.run(move |conn| reader::read_all(conn, &table)).await
    }

    pub async fn read_column(&self, table: TableName, column: &str) -> Result<Vec<Value>> {
        let column = column.to_string();
        self.pool
            .run(move |conn| reader::read_column(conn, &table, &column))
            .await
    }

    pub async fn list_datasets(&self) -> Result<Vec<String>> {
        self.pool.run(|conn| reader::list_datasets(conn)).await
    }

    pub async fn list_planograms(&self) -> Result<Vec<String>> {
        self.pool.run(|conn| reader::list_planograms(conn)).await
    }

    pub async fn list_tenant_links(&self, username: &str) -> Result<Vec<TenantLink>> {
        self.table(TableFamily::TenantLinks, &[username])?;
        let resolver = self.resolver;
        let username = username.to_string();
        self.pool
            .run(move |conn| reader::list_tenant_links(conn, &resolver, &username))
            .await
    }

    // =========================================================================
    // Keyed Mutation
    // =========================================================================

    pub async fn update_row(&self, table: TableName, key: Value, updates: Row) -> Result<usize> {
        self.pool
            .run(move |conn| mutate::update_row(conn, &table, &key, &updates))
            .await
    }

    pub async fn delete_row(&self, table: TableName, key: Value) -> Result<usize> {
        self.pool
            .run(move |conn| mutate::delete_row(conn, &table, &key))
            .await
    }

    // =========================================================================
    // Back Office
    // =========================================================================

    /// Adds a menu category and returns its id.
    pub async fn add_category(&self, categoria: &str) -> Result<i64> {
        let resolver = self.resolver;
        let categoria = categoria.to_string();
        self.pool
            .run(move |conn| backoffice::add_category(conn, &resolver, &categoria))
            .await
    }

    pub async fn list_categories(&self) -> Result<Vec<Row>> {
        let resolver = self.resolver;
        self.pool
            .run(move |conn| backoffice::list_categories(conn, &resolver))
            .await
    }

    /// Adds a menu product and returns its id.
    pub async fn add_product(&self, product: Product) -> Result<i64> {
        let resolver = self.resolver;
        self.pool
            .run(move |conn| backoffice::add_product(conn, &resolver, &product))
            .await
    }

    /// Active products filed under `categoria`.
    pub async fn list_active_products(&self, categoria: &str) -> Result<Vec<Row>> {
        let resolver = self.resolver;
        let categoria = categoria.to_string();
        self.pool
            .run(move |conn| backoffice::list_active_products(conn, &resolver, &categoria))
            .await
    }

    /// Registers a mesa and returns its row id.
    pub async fn add_mesa(&self, mesa: i64, estado: &str) -> Result<i64> {
        let resolver = self.resolver;
        let estado = estado.to_string();
        self.pool
            .run(move |conn| backoffice::add_mesa(conn, &resolver, mesa, &estado))
            .await
    }

    pub async fn list_mesas(&self) -> Result<Vec<Row>> {
        let resolver = self.resolver;
        self.pool
            .run(move |conn| backoffice::list_mesas(conn, &resolver))
            .await
    }

    pub async fn update_mesa(&self, id: i64, mesa: i64, estado: &str) -> Result<usize> {
        let resolver = self.resolver;
        let estado = estado.to_string();
        self.pool
            .run(move |conn| backoffice::update_mesa(conn, &resolver, id, mesa, &estado))
            .await
    }

    /// Records a settled bill and returns its id.
    pub async fn record_payment(&self, payment: Payment) -> Result<i64> {
        let resolver = self.resolver;
        self.pool
            .run(move |conn| backoffice::record_payment(conn, &resolver, &payment))
            .await
    }

    pub async fn list_payments(&self) -> Result<Vec<Row>> {
        let resolver = self.resolver;
        self.pool
            .run(move |conn| backoffice::list_payments(conn, &resolver))
            .await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Writes `batch` to the ledger and replaces its mesa's mirror.
    pub async fn submit_orders(&self, batch: OrderBatch) -> Result<OrderReceipt> {
        batch.mesa()?;
        let resolver = self.resolver;
        self.pool
            .run(move |conn| orders::submit_orders(conn, &resolver, &batch))
            .await
    }

    pub async fn append_order_line(&self, line: OrderLine) -> Result<OrderReceipt> {
        let resolver = self.resolver;
        self.pool
            .run(move |conn| orders::append_order_line(conn, &resolver, &line))
            .await
    }

    pub async fn update_order_quantity(
        &self,
        mesa: i64,
        producto: &str,
        cantidad: i64,
    ) -> Result<usize> {
        let producto = producto.to_string();
        let resolver = self.resolver;
        self.pool
            .run(move |conn| orders::update_order_quantity(conn, &resolver, mesa, &producto, cantidad))
            .await
    }

    pub async fn read_ledger(&self) -> Result<Vec<Row>> {
        let resolver = self.resolver;
        self.pool
            .run(move |conn| reader::read_ledger(conn, &resolver))
            .await
    }

    pub async fn read_mirror(&self, mesa: i64) -> Result<Vec<Row>> {
        let resolver = self.resolver;
        self.pool
            .run(move |conn| reader::read_mirror(conn, &resolver, mesa))
            .await
    }
}

// =============================================================================
// Tests
// =============================================================================
