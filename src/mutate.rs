//! # Keyed Row Mutation
//!
//! Updates or deletes one row of a dynamically named table, addressed by the
//! family's natural key column:
//!
//! | Family | Key column |
//! |--------|------------|
//! | Dataset, UserDatasetCopy, Inventory | `rank` |
//! | Planogram | `frente` |
//!
//! Matching zero rows is reported as `Error::NotFound`, which callers treat
//! as an outcome rather than a failure.

use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ident::{quote, validate_identifier, TableName};
use crate::schema::{natural_key, table_exists};
use crate::types::{Row, Value};

fn key_column(table: &TableName) -> Result<&'static str> {
    natural_key(table.family()).ok_or_else(|| {
        Error::Validation(format!(
            "{} tables have no natural key for row updates",
            table.family()
        ))
    })
}

fn require_key(key: &Value, key_column: &str) -> Result<()> {
    let missing = match key {
        Value::Null => true,
        Value::Text(s) => s.trim().is_empty(),
        _ => false,
    };
    if missing {
        return Err(Error::Validation(format!("missing {key_column} to identify the row")));
    }
    Ok(())
}

fn not_found(table: &TableName, key_column: &str, key: &Value) -> Error {
    Error::NotFound {
        table: table.to_string(),
        key_column: key_column.to_string(),
        key: key.to_string(),
    }
}

/// Sets the columns in `updates` on the row whose natural key equals `key`.
///
/// The key column itself is never rewritten; if `updates` only names the key
/// column the payload counts as empty.
///
/// # Errors
///
/// - `Error::Validation` for a missing key, an empty payload, or a family
///   without a natural key
/// - `Error::InvalidIdentifier` for an unsafe column name in `updates`
/// - `Error::NotFound` if no row matched
pub fn update_row(conn: &Connection, table: &TableName, key: &Value, updates: &Row) -> Result<usize> {
    let key_column = key_column(table)?;
    require_key(key, key_column)?;

    let assignments: Vec<(&str, &Value)> = updates
        .iter()
        .filter(|(column, _)| *column != key_column)
        .collect();
    if assignments.is_empty() {
        return Err(Error::Validation("no fields to update".to_string()));
    }
    for (column, _) in &assignments {
        validate_identifier(column)?;
    }

    if !table_exists(conn, table.as_str())? {
        return Err(not_found(table, key_column, key));
    }

    let set_clause = assignments
        .iter()
        .map(|(column, _)| format!("{} = ?", quote(column)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table.quoted(),
        set_clause,
        quote(key_column)
    );

    let params = assignments.iter().map(|(_, value)| *value).chain(std::iter::once(key));
    let changed = conn.execute(&sql, params_from_iter(params))?;
    if changed == 0 {
        return Err(not_found(table, key_column, key));
    }

    debug!(table = %table, key = %key, changed, "row updated");
    Ok(changed)
}

/// Deletes the row whose natural key equals `key`.
pub fn delete_row(conn: &Connection, table: &TableName, key: &Value) -> Result<usize> {
    let key_column = key_column(table)?;
    require_key(key, key_column)?;

    if !table_exists(conn, table.as_str())? {
        return Err(not_found(table, key_column, key));
    }

    let deleted = conn.execute(
        &format!("DELETE FROM {} WHERE {} = ?", table.quoted(), quote(key_column)),
        [key],
    )?;
    if deleted == 0 {
        return Err(not_found(table, key_column, key));
    }

    debug!(table = %table, key = %key, deleted, "row deleted");
    Ok(deleted)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{resolve, TableFamily};
    use crate::ingest::{provision_and_ingest, IngestMode};
    use crate::schema::Database;
    use crate::types::SpreadsheetGrid;

    fn dataset(db: &mut Database) -> TableName {
        let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();
        let grid = SpreadsheetGrid::from_parts(
            &["marca", "rank", "vol_ytd"],
            vec![
                vec![Value::from("Coca"), Value::from("1"), Value::from(10.0)],
                vec![Value::from("Pepsi"), Value::from("2"), Value::from(8.0)],
            ],
        );
        provision_and_ingest(db.connection_mut(), &table, &grid, IngestMode::Atomic).unwrap();
        table
    }

    #[test]
    fn test_update_by_rank() {
        let mut db = Database::open_in_memory().unwrap();
        let table = dataset(&mut db);

        let updates = Row::new().with("marca", "Coca Zero").with("vol_ytd", 11.5);
        assert_eq!(update_row(db.connection(), &table, &Value::from("1"), &updates).unwrap(), 1);

        let marca: String = db
            .connection()
            .query_row("SELECT marca FROM baseDeDatos_abc WHERE rank = '1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(marca, "Coca Zero");
    }

    #[test]
    fn test_update_rejects_bad_requests() {
        let mut db = Database::open_in_memory().unwrap();
        let table = dataset(&mut db);
        let conn = db.connection();

        let updates = Row::new().with("marca", "x");
        let err = update_row(conn, &table, &Value::Null, &updates).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = update_row(conn, &table, &Value::from("1"), &Row::new()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let only_key = Row::new().with("rank", "9");
        let err = update_row(conn, &table, &Value::from("1"), &only_key).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let unsafe_column = Row::new().with("marca = 'x'; --", "y");
        let err = update_row(conn, &table, &Value::from("1"), &unsafe_column).unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_unmatched_key_is_not_found() {
        let mut db = Database::open_in_memory().unwrap();
        let table = dataset(&mut db);

        let updates = Row::new().with("marca", "x");
        let err = update_row(db.connection(), &table, &Value::from("77"), &updates).unwrap_err();
        assert!(err.is_not_found());

        let err = delete_row(db.connection(), &table, &Value::from("77")).unwrap_err();
        assert!(err.is_not_found());

        let missing = resolve(TableFamily::Dataset, &["never"]).unwrap();
        let err = delete_row(db.connection(), &missing, &Value::from("1")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_by_frente() {
        let mut db = Database::open_in_memory().unwrap();
        let table = resolve(TableFamily::Planogram, &["p1"]).unwrap();
        let grid = SpreadsheetGrid::from_parts(
            &["frente", "espacio"],
            vec![
                vec![Value::from(1.0), Value::from(3.0)],
                vec![Value::from(2.0), Value::from(4.0)],
            ],
        );
        provision_and_ingest(db.connection_mut(), &table, &grid, IngestMode::Atomic).unwrap();

        assert_eq!(delete_row(db.connection(), &table, &Value::from(2.0)).unwrap(), 1);
        let left: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM planograma_p1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(left, 1);
    }

    #[test]
    fn test_family_without_key_rejected() {
        let db = Database::open_in_memory().unwrap();
        let mirror = resolve(TableFamily::OrderMirror, &["5"]).unwrap();
        let err = delete_row(db.connection(), &mirror, &Value::from("1")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
