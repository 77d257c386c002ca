//! Provisioning Tests
//!
//! Tests the create-if-absent invariants:
//! - `Created` then `AlreadyExists`, with exactly one catalog entry
//! - Concurrent provisioning of one new key leaves one table and one entry
//! - Unsafe keys never reach the store
//! - Keys differing only in ASCII case name the same table and catalog entry

mod common;

use tablesmith::provision::{ensure_table, ensure_table_atomic};
use tablesmith::{resolve, Database, Error, Provisioned, TableFamily};

#[test]
fn ensure_twice_created_then_already_exists() {
    let (_dir, path) = common::create_temp_db_file("ensure_twice.db");
    let mut db = Database::open(&path).unwrap();

    for key in ["abc", "XYZ_1", "_"] {
        let table = resolve(TableFamily::Dataset, &[key]).unwrap();
        assert_eq!(
            ensure_table_atomic(db.connection_mut(), &table).unwrap(),
            Provisioned::Created
        );
        assert_eq!(
            ensure_table_atomic(db.connection_mut(), &table).unwrap(),
            Provisioned::AlreadyExists
        );
    }

    let conn = common::open_read_only(&path);
    assert_eq!(
        common::catalog_keys(&conn, "bases_datos", "nombre_base_datos"),
        vec!["abc", "XYZ_1", "_"]
    );
}

/// SQLite table names ignore case, so `ABC` after `abc` is the same table.
#[test]
fn case_variant_key_already_exists() {
    let (_dir, path) = common::create_temp_db_file("case_variant.db");
    let mut db = Database::open(&path).unwrap();

    let lower = resolve(TableFamily::Dataset, &["abc"]).unwrap();
    let upper = resolve(TableFamily::Dataset, &["ABC"]).unwrap();
    assert_eq!(
        ensure_table_atomic(db.connection_mut(), &lower).unwrap(),
        Provisioned::Created
    );
    assert_eq!(
        ensure_table_atomic(db.connection_mut(), &upper).unwrap(),
        Provisioned::AlreadyExists
    );

    let conn = common::open_read_only(&path);
    assert_eq!(
        common::catalog_keys(&conn, "bases_datos", "nombre_base_datos"),
        vec!["abc"]
    );
}

#[test]
fn every_fixed_schema_family_provisions() {
    let db = Database::open_in_memory().unwrap();
    let tables = [
        resolve(TableFamily::Dataset, &["d"]).unwrap(),
        resolve(TableFamily::Planogram, &["p"]).unwrap(),
        resolve(TableFamily::TenantLinks, &["ana"]).unwrap(),
        resolve(TableFamily::OrderMirror, &["3"]).unwrap(),
        resolve(TableFamily::OrderLedger, &[]).unwrap(),
        resolve(TableFamily::Categories, &[]).unwrap(),
        resolve(TableFamily::Products, &[]).unwrap(),
        resolve(TableFamily::Mesas, &[]).unwrap(),
        resolve(TableFamily::Payments, &[]).unwrap(),
    ];
    for table in &tables {
        assert!(ensure_table(db.connection(), table).unwrap().was_created());
        assert!(common::table_exists(db.connection(), table.as_str()));
    }
    assert_eq!(
        common::column_names(db.connection(), "ordenes"),
        vec!["id", "mesa", "producto", "cantidad", "precioUnitario", "entregado", "pagado"]
    );
    assert_eq!(
        common::column_names(db.connection(), "productos"),
        vec!["id", "nombre", "precio", "categoria", "estado"]
    );
}

/// Many connections race to provision the same new key.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_provisioning_single_table_single_entry() {
    let (_dir, path) = common::create_temp_db_file("race.db");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let path = path.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let mut conn = common::open_read_write(&path);
            conn.busy_timeout(std::time::Duration::from_secs(5)).unwrap();
            let table = resolve(TableFamily::Planogram, &["shared"]).unwrap();
            ensure_table_atomic(&mut conn, &table).unwrap()
        }));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().was_created() {
            created += 1;
        }
    }
    assert_eq!(created, 1, "exactly one caller observes the creation");

    let conn = common::open_read_only(&path);
    assert!(common::table_exists(&conn, "planograma_shared"));
    assert_eq!(
        common::catalog_keys(&conn, "bases_planograma", "nombre_planograma"),
        vec!["shared"]
    );
}

#[test]
fn unsafe_keys_rejected() {
    for bad in ["a;b", "a b", "a`b", ""] {
        let err = resolve(TableFamily::Dataset, &[bad]).unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier { .. }), "{bad:?}");
    }
}

#[test]
fn reopen_keeps_catalog() {
    let (_dir, path) = common::create_temp_db_file("reopen.db");
    {
        let mut db = Database::open(&path).unwrap();
        let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();
        ensure_table_atomic(db.connection_mut(), &table).unwrap();
    }

    let mut db = Database::open(&path).unwrap();
    let table = resolve(TableFamily::Dataset, &["abc"]).unwrap();
    assert_eq!(
        ensure_table_atomic(db.connection_mut(), &table).unwrap(),
        Provisioned::AlreadyExists
    );
    assert_eq!(
        common::catalog_keys(db.connection(), "bases_datos", "nombre_base_datos"),
        vec!["abc"]
    );
}
