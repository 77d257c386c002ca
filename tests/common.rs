#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tablesmith::{Config, Database, SpreadsheetGrid, Tablesmith, Value};

pub fn create_temp_db_file(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let _ = Database::open(&path).expect("initialize database");
    (dir, path)
}

pub async fn open_store(name: &str, pool_size: usize) -> (tempfile::TempDir, PathBuf, Tablesmith) {
    let (dir, path) = create_temp_db_file(name);
    let config = Config {
        pool_size,
        ..Config::new(&path)
    };
    let store = Tablesmith::open(config).await.expect("open store");
    (dir, path, store)
}

pub fn open_read_only(path: &Path) -> Connection {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .expect("open read-only connection")
}

pub fn open_read_write(path: &Path) -> Connection {
    Connection::open(path).expect("open read-write connection")
}

pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
        .expect("count rows")
}

pub fn table_exists(conn: &Connection, table: &str) -> bool {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        [table],
        |row| row.get(0),
    )
    .expect("check table")
}

pub fn column_names(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare(&format!("SELECT name FROM pragma_table_info('{table}')"))
        .expect("prepare table_info");
    stmt.query_map([], |row| row.get(0))
        .expect("query table_info")
        .collect::<Result<Vec<String>, _>>()
        .expect("collect columns")
}

pub fn catalog_keys(conn: &Connection, catalog: &str, column: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare(&format!("SELECT \"{column}\" FROM \"{catalog}\" ORDER BY id"))
        .expect("prepare catalog");
    stmt.query_map([], |row| row.get(0))
        .expect("query catalog")
        .collect::<Result<Vec<String>, _>>()
        .expect("collect catalog")
}

/// A dataset grid with `rows` data rows: `marca`, `rank`, `vol_ytd`.
pub fn dataset_grid(rows: usize) -> SpreadsheetGrid {
    SpreadsheetGrid::from_parts(
        &["marca", "rank", "vol_ytd"],
        (0..rows)
            .map(|r| {
                vec![
                    Value::from(format!("marca-{r}")),
                    Value::from((r + 1).to_string()),
                    Value::from(r as f64 * 1.5),
                ]
            })
            .collect(),
    )
}
