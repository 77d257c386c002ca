//! Ingestion Tests
//!
//! Tests replace-only bulk ingestion:
//! - After ingesting N data rows the table holds exactly N rows
//! - Ingesting the same grid twice leaves the same contents
//! - Atomic mode rolls back to the previous contents on failure
//! - Per-row mode reports the failing row and keeps the rows before it

mod common;

use tablesmith::ingest::{ingest, IngestMode};
use tablesmith::{
    resolve, Config, Database, Error, Provisioned, SpreadsheetGrid, TableFamily, Tablesmith, Value,
};

/// Rejects any insert whose `marca` is `'boom'`.
fn install_poison_trigger(conn: &rusqlite::Connection, table: &str) {
    conn.execute_batch(&format!(
        "CREATE TRIGGER poison BEFORE INSERT ON \"{table}\" \
         WHEN NEW.marca = 'boom' BEGIN SELECT RAISE(ABORT, 'poisoned row'); END"
    ))
    .unwrap();
}

fn grid_with_poison_at(rows: usize, poison: usize) -> SpreadsheetGrid {
    SpreadsheetGrid::from_parts(
        &["marca", "rank"],
        (0..rows)
            .map(|r| {
                let marca = if r == poison { "boom".to_string() } else { format!("m{r}") };
                vec![Value::from(marca), Value::from(r.to_string())]
            })
            .collect(),
    )
}

/// The upload scenario: three rows into a brand new dataset key.
#[tokio::test]
async fn first_upload_creates_table_and_catalog_entry() {
    let (_dir, path, store) = common::open_store("first_upload.db", 2).await;

    let grid = SpreadsheetGrid::from_parts(
        &["marca", "vol_ytd"],
        vec![
            vec![Value::from("Coca"), Value::from(10.0)],
            vec![Value::from("Pepsi"), Value::from(7.5)],
            vec![Value::from("Jarritos"), Value::Null],
        ],
    );
    let report = store.ingest_dataset("abc", grid).await.unwrap();

    assert_eq!(report.table, "baseDeDatos_abc");
    assert_eq!(report.provisioned, Provisioned::Created);
    assert_eq!(report.rows_deleted, 0);
    assert_eq!(report.rows_written, 3);

    let conn = common::open_read_only(&path);
    assert_eq!(common::count_rows(&conn, "baseDeDatos_abc"), 3);
    assert_eq!(
        common::catalog_keys(&conn, "bases_datos", "nombre_base_datos"),
        vec!["abc"]
    );

    let table = store.table(TableFamily::Dataset, &["abc"]).unwrap();
    let rows = store.read_all(table).await.unwrap();
    assert_eq!(rows[1].get("marca"), Some(&Value::from("Pepsi")));
    assert_eq!(rows[2].get("vol_ytd"), Some(&Value::Null));
}

/// Re-uploading replaces rather than appends, and is idempotent.
#[tokio::test]
async fn repeated_ingest_replaces_contents() {
    let (_dir, path, store) = common::open_store("replace.db", 2).await;

    store.ingest_dataset("abc", common::dataset_grid(10)).await.unwrap();
    let second = store.ingest_dataset("abc", common::dataset_grid(4)).await.unwrap();
    assert_eq!(second.provisioned, Provisioned::AlreadyExists);
    assert_eq!(second.rows_deleted, 10);
    assert_eq!(second.rows_written, 4);

    let table = store.table(TableFamily::Dataset, &["abc"]).unwrap();
    let before = store.read_all(table.clone()).await.unwrap();
    store.ingest_dataset("abc", common::dataset_grid(4)).await.unwrap();
    let after = store.read_all(table).await.unwrap();
    assert_eq!(before, after);

    let conn = common::open_read_only(&path);
    assert_eq!(common::count_rows(&conn, "baseDeDatos_abc"), 4);
    assert_eq!(common::catalog_keys(&conn, "bases_datos", "nombre_base_datos").len(), 1);
}

/// A header-only grid empties the table.
#[tokio::test]
async fn header_only_grid_clears_table() {
    let (_dir, _path, store) = common::open_store("header_only.db", 1).await;
    store.ingest_planogram("p1", SpreadsheetGrid::from_parts(&["frente"], vec![vec![Value::from(1.0)]]))
        .await
        .unwrap();

    let report = store
        .ingest_planogram("p1", SpreadsheetGrid::from_parts(&["frente"], Vec::new()))
        .await
        .unwrap();
    assert_eq!(report.rows_deleted, 1);
    assert_eq!(report.rows_written, 0);

    let table = store.table(TableFamily::Planogram, &["p1"]).unwrap();
    assert!(store.read_all(table).await.unwrap().is_empty());
}

#[test]
fn atomic_failure_keeps_previous_contents() {
    let mut db = Database::open_in_memory().unwrap();
    let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();
    tablesmith::ingest::provision_and_ingest(
        db.connection_mut(),
        &table,
        &common::dataset_grid(3),
        IngestMode::Atomic,
    )
    .unwrap();
    install_poison_trigger(db.connection(), table.as_str());

    let err = ingest(
        db.connection_mut(),
        &table,
        &grid_with_poison_at(5, 3),
        IngestMode::Atomic,
    )
    .unwrap_err();
    assert!(matches!(err, Error::IngestionAborted { .. }), "{err}");

    let marcas: Vec<String> = db
        .connection()
        .prepare("SELECT marca FROM baseDeDatos_abc ORDER BY id")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(marcas, vec!["marca-0", "marca-1", "marca-2"]);
}

#[test]
fn per_row_failure_names_row_and_keeps_prefix() {
    let mut db = Database::open_in_memory().unwrap();
    let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();
    tablesmith::ingest::provision_and_ingest(
        db.connection_mut(),
        &table,
        &common::dataset_grid(3),
        IngestMode::PerRow,
    )
    .unwrap();
    install_poison_trigger(db.connection(), table.as_str());

    let err = ingest(
        db.connection_mut(),
        &table,
        &grid_with_poison_at(5, 2),
        IngestMode::PerRow,
    )
    .unwrap_err();
    match err {
        Error::IngestionRowFailed { row, .. } => assert_eq!(row, 3),
        other => panic!("expected IngestionRowFailed, got {other}"),
    }
    // Old rows are gone, the two rows before the failure stay.
    assert_eq!(common::count_rows(db.connection(), "baseDeDatos_abc"), 2);
}

#[test]
fn unknown_header_fails_before_any_row() {
    let mut db = Database::open_in_memory().unwrap();
    let table = resolve(TableFamily::Planogram, &["p"]).unwrap();
    tablesmith::provision::ensure_table_atomic(db.connection_mut(), &table).unwrap();

    let grid = SpreadsheetGrid::from_parts(&["no_such_column"], vec![vec![Value::from(1i64)]]);
    let err = ingest(db.connection_mut(), &table, &grid, IngestMode::Atomic).unwrap_err();
    assert!(matches!(err, Error::IngestionAborted { .. }));

    let grid = SpreadsheetGrid::from_parts(&["bad;header"], vec![vec![Value::from(1i64)]]);
    let err = ingest(db.connection_mut(), &table, &grid, IngestMode::Atomic).unwrap_err();
    assert!(matches!(err, Error::InvalidIdentifier { .. }));
}

/// Per-row mode is selectable through configuration.
#[tokio::test]
async fn configured_ingest_mode_is_used() {
    let (_dir, path) = common::create_temp_db_file("per_row_config.db");
    let store = Tablesmith::open(Config {
        ingest_mode: IngestMode::PerRow,
        pool_size: 1,
        ..Config::new(&path)
    })
    .await
    .unwrap();

    store.ingest_dataset("abc", common::dataset_grid(2)).await.unwrap();
    {
        let conn = common::open_read_write(&path);
        install_poison_trigger(&conn, "baseDeDatos_abc");
    }

    let err = store
        .ingest_dataset("abc", grid_with_poison_at(3, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IngestionRowFailed { row: 2, .. }), "{err}");

    let conn = common::open_read_only(&path);
    assert_eq!(common::count_rows(&conn, "baseDeDatos_abc"), 1);
}

/// Unsafe keys are rejected before any connection is used.
#[tokio::test]
async fn unsafe_dataset_key_rejected() {
    let (_dir, path, store) = common::open_store("unsafe.db", 1).await;

    for bad in ["x; DROP TABLE data", "a b", "a`b", ""] {
        let err = store.ingest_dataset(bad, common::dataset_grid(1)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier { .. }), "{bad:?}");
    }

    let conn = common::open_read_only(&path);
    assert!(common::table_exists(&conn, "data"));
    assert!(common::catalog_keys(&conn, "bases_datos", "nombre_base_datos").is_empty());
}
