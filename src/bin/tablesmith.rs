//! Command-line front end for a Tablesmith database.
//!
//! Every subcommand maps to one `Tablesmith` operation and prints its result
//! as JSON on stdout. Logs go to stderr, filtered by `RUST_LOG`.
//!
//! ```bash
//! tablesmith --db shop.db ingest dataset abc ventas.csv
//! tablesmith --db shop.db link ana abc
//! tablesmith --db shop.db orders submit batch.json
//! tablesmith --db shop.db orders mirror 5
//! tablesmith --db shop.db menu product Taco 30 Comida
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tablesmith::{
    Config, IngestMode, OrderBatch, OrderLine, Payment, Product, Row, TableFamily, Tablesmith,
    Value,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tablesmith", version, about = "Dynamic table provisioning and order dual-writes on SQLite")]
struct Cli {
    /// Database file (overrides TABLESMITH_DB).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Connection pool size (overrides TABLESMITH_POOL_SIZE).
    #[arg(long, global = true)]
    pool_size: Option<usize>,

    /// Busy timeout in milliseconds (overrides TABLESMITH_BUSY_TIMEOUT_MS).
    #[arg(long, global = true)]
    busy_timeout_ms: Option<u64>,

    /// `atomic` or `per-row` (overrides TABLESMITH_INGEST_MODE).
    #[arg(long, global = true)]
    ingest_mode: Option<IngestMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace a dataset or planogram table with the rows of a CSV file.
    Ingest {
        family: UploadFamily,
        key: String,
        file: PathBuf,
    },
    /// Give a user a private copy of a dataset.
    Link { username: String, dataset: String },
    /// Re-copy the live table into the user's inventory and print it.
    Inventory { username: String },
    /// Print every row, or one column, of a family table.
    Read {
        family: KeyedFamily,
        /// Key tokens; a user dataset copy takes `<username> <dataset>`.
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long)]
        column: Option<String>,
    },
    /// Update one row addressed by its natural key (`rank` or `frente`).
    Update {
        family: KeyedFamily,
        #[arg(required = true)]
        keys: Vec<String>,
        /// Natural key value of the row.
        #[arg(long = "where")]
        key: String,
        /// `column=value`, repeatable.
        #[arg(long = "set", value_parser = parse_assignment, required = true)]
        set: Vec<(String, String)>,
    },
    /// Delete one row addressed by its natural key.
    Delete {
        family: KeyedFamily,
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long = "where")]
        key: String,
    },
    /// List catalogued datasets, planograms, or a user's linked datasets.
    List {
        #[command(subcommand)]
        what: ListCommand,
    },
    /// Order ledger and mirrors.
    Orders {
        #[command(subcommand)]
        action: OrderCommand,
    },
    /// Menu categories and products.
    Menu {
        #[command(subcommand)]
        action: MenuCommand,
    },
    /// Register, list or update mesas.
    Mesas {
        #[command(subcommand)]
        action: MesaCommand,
    },
    /// Record or list today's payments.
    Payments {
        #[command(subcommand)]
        action: PaymentCommand,
    },
}

#[derive(Subcommand, Debug)]
enum MenuCommand {
    Category { categoria: String },
    Categories,
    Product {
        nombre: String,
        precio: i64,
        categoria: String,
        #[arg(long, default_value = "activo")]
        estado: String,
    },
    /// Active products of one category.
    Products { categoria: String },
}

#[derive(Subcommand, Debug)]
enum MesaCommand {
    Add { mesa: i64, estado: String },
    List,
    /// Update the mesa row with id `id`.
    Update { id: i64, mesa: i64, estado: String },
}

#[derive(Subcommand, Debug)]
enum PaymentCommand {
    /// Record a JSON payment: `{"metodoPago": 1, "totalVenta": 100, ...}`.
    Record { file: PathBuf },
    List,
}

#[derive(Subcommand, Debug)]
enum ListCommand {
    Datasets,
    Planograms,
    Links { username: String },
}

#[derive(Subcommand, Debug)]
enum OrderCommand {
    /// Submit a JSON batch: `{"ordenes": [{"mesa": 5, "producto": ...}]}`.
    Submit { file: PathBuf },
    /// Append a single line without clearing the mirror.
    Append {
        mesa: i64,
        producto: String,
        cantidad: i64,
        precio_unitario: i64,
    },
    /// Change a product's quantity in the ledger and the mirror.
    SetQuantity {
        mesa: i64,
        producto: String,
        cantidad: i64,
    },
    Ledger,
    Mirror { mesa: i64 },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum UploadFamily {
    Dataset,
    Planogram,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KeyedFamily {
    Dataset,
    Planogram,
    UserDataset,
    Inventory,
}

impl From<UploadFamily> for TableFamily {
    fn from(family: UploadFamily) -> Self {
        match family {
            UploadFamily::Dataset => TableFamily::Dataset,
            UploadFamily::Planogram => TableFamily::Planogram,
        }
    }
}

impl From<KeyedFamily> for TableFamily {
    fn from(family: KeyedFamily) -> Self {
        match family {
            KeyedFamily::Dataset => TableFamily::Dataset,
            KeyedFamily::Planogram => TableFamily::Planogram,
            KeyedFamily::UserDataset => TableFamily::UserDatasetCopy,
            KeyedFamily::Inventory => TableFamily::Inventory,
        }
    }
}

fn parse_assignment(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(column, value)| (column.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected column=value, got '{raw}'"))
}

fn config_from(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }
    if let Some(size) = cli.pool_size {
        config.pool_size = size;
    }
    if let Some(ms) = cli.busy_timeout_ms {
        config.busy_timeout = Duration::from_millis(ms);
    }
    if let Some(mode) = cli.ingest_mode {
        config.ingest_mode = mode;
    }
    config.validate()?;
    Ok(config)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tablesmith=info,warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = config_from(&cli)?;
    let store = Tablesmith::open(config).await?;

    match cli.command {
        Command::Ingest { family, key, file } => {
            let report = store.ingest_file(family.into(), &key, file).await?;
            print_json(&serde_json::json!({
                "table": report.table,
                "created": report.provisioned.was_created(),
                "rows_deleted": report.rows_deleted,
                "rows_written": report.rows_written,
            }))?;
        }
        Command::Link { username, dataset } => {
            let outcome = store.link_dataset(&username, &dataset).await?;
            print_json(&serde_json::json!({ "outcome": format!("{outcome:?}") }))?;
        }
        Command::Inventory { username } => {
            print_json(&store.refresh_inventory(&username).await?)?;
        }
        Command::Read { family, keys, column } => {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            let table = store.table(family.into(), &keys)?;
            match column {
                Some(column) => print_json(&store.read_column(table, &column).await?)?,
                None => print_json(&store.read_all(table).await?)?,
            }
        }
        Command::Update { family, keys, key, set } => {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            let table = store.table(family.into(), &keys)?;
            let updates: Row = set
                .into_iter()
                .map(|(column, value)| (column, Value::from(value)))
                .collect();
            let changed = store.update_row(table, Value::from(key), updates).await?;
            print_json(&serde_json::json!({ "updated": changed }))?;
        }
        Command::Delete { family, keys, key } => {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            let table = store.table(family.into(), &keys)?;
            let deleted = store.delete_row(table, Value::from(key)).await?;
            print_json(&serde_json::json!({ "deleted": deleted }))?;
        }
        Command::List { what } => match what {
            ListCommand::Datasets => print_json(&store.list_datasets().await?)?,
            ListCommand::Planograms => print_json(&store.list_planograms().await?)?,
            ListCommand::Links { username } => {
                print_json(&store.list_tenant_links(&username).await?)?
            }
        },
        Command::Orders { action } => match action {
            OrderCommand::Submit { file } => {
                let raw = std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                let batch: OrderBatch = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing {}", file.display()))?;
                let receipt = store.submit_orders(batch).await?;
                print_json(&serde_json::json!({
                    "mesa": receipt.mesa,
                    "mirror": receipt.mirror_table,
                    "rows_written": receipt.rows_written,
                }))?;
            }
            OrderCommand::Append {
                mesa,
                producto,
                cantidad,
                precio_unitario,
            } => {
                let line = OrderLine::new(mesa, producto, cantidad, precio_unitario);
                let receipt = store.append_order_line(line).await?;
                print_json(&serde_json::json!({ "mirror": receipt.mirror_table }))?;
            }
            OrderCommand::SetQuantity {
                mesa,
                producto,
                cantidad,
            } => {
                let changed = store.update_order_quantity(mesa, &producto, cantidad).await?;
                print_json(&serde_json::json!({ "updated": changed }))?;
            }
            OrderCommand::Ledger => print_json(&store.read_ledger().await?)?,
            OrderCommand::Mirror { mesa } => print_json(&store.read_mirror(mesa).await?)?,
        },
        Command::Menu { action } => match action {
            MenuCommand::Category { categoria } => {
                let id = store.add_category(&categoria).await?;
                print_json(&serde_json::json!({ "id": id }))?;
            }
            MenuCommand::Categories => print_json(&store.list_categories().await?)?,
            MenuCommand::Product {
                nombre,
                precio,
                categoria,
                estado,
            } => {
                let product = Product {
                    estado,
                    ..Product::new(nombre, precio, categoria)
                };
                let id = store.add_product(product).await?;
                print_json(&serde_json::json!({ "id": id }))?;
            }
            MenuCommand::Products { categoria } => {
                print_json(&store.list_active_products(&categoria).await?)?
            }
        },
        Command::Mesas { action } => match action {
            MesaCommand::Add { mesa, estado } => {
                let id = store.add_mesa(mesa, &estado).await?;
                print_json(&serde_json::json!({ "id": id }))?;
            }
            MesaCommand::List => print_json(&store.list_mesas().await?)?,
            MesaCommand::Update { id, mesa, estado } => {
                let changed = store.update_mesa(id, mesa, &estado).await?;
                print_json(&serde_json::json!({ "updated": changed }))?;
            }
        },
        Command::Payments { action } => match action {
            PaymentCommand::Record { file } => {
                let raw = std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                let payment: Payment = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing {}", file.display()))?;
                let id = store.record_payment(payment).await?;
                print_json(&serde_json::json!({ "id": id }))?;
            }
            PaymentCommand::List => print_json(&store.list_payments().await?)?,
        },
    }

    store.close();
    Ok(())
}
