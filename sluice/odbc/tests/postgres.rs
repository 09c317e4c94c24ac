//! Tests against a live PostgreSQL server reached through the psqlODBC driver.
//!
//! Run with: cargo test -p sluice-odbc --features odbc_tests

#![cfg(feature = "odbc_tests")]

use std::sync::Arc;

use datafusion::arrow::array::{ArrayRef, Float64Array, Int32Array, RecordBatch, StringArray};
use sluice_odbc::OdbcConnection;

const CONNECTION_STRING: &str = "\
    Driver={PostgreSQL Unicode};\
    Server=localhost;\
    UID=postgres;\
    PWD=postgres;\
";

fn batch(ids: Vec<i32>) -> RecordBatch {
    let amounts = ids.iter().map(|i| *i as f64 * 10.0).collect::<Vec<f64>>();
    let regions = ids.iter().map(|_| "North").collect::<Vec<&str>>();

    RecordBatch::try_from_iter(vec![
        ("sale_id", Arc::new(Int32Array::from(ids)) as ArrayRef),
        ("region", Arc::new(StringArray::from(regions)) as ArrayRef),
        ("sale_amount", Arc::new(Float64Array::from(amounts)) as ArrayRef),
    ])
    .unwrap()
}

#[test]
#[tracing_test::traced_test]
fn test_replace_table_swaps_contents() {
    let connection = OdbcConnection::connect(CONNECTION_STRING, 100).unwrap();

    let first = batch((1..=10).collect());
    connection
        .replace_table("sluice_odbc_replace", first.schema(), vec![first])
        .unwrap();

    let second = batch((1..=3).collect());
    let written = connection
        .replace_table("sluice_odbc_replace", second.schema(), vec![second])
        .unwrap();
    assert_eq!(written, 3);

    let rows = connection
        .query("SELECT * FROM sluice_odbc_replace")
        .unwrap()
        .iter()
        .map(|b| b.num_rows())
        .sum::<usize>();
    assert_eq!(rows, 3);

    assert!(connection.table_exists("sluice_odbc_replace").unwrap());
    assert!(!connection.table_exists("sluice_odbc_staging_missing").unwrap());

    connection
        .execute("DROP TABLE sluice_odbc_replace")
        .unwrap();
}

#[test]
#[tracing_test::traced_test]
fn test_failed_swap_restores_autocommit_and_drops_staging() {
    let connection = OdbcConnection::connect(CONNECTION_STRING, 100).unwrap();
    let observer = OdbcConnection::connect(CONNECTION_STRING, 100).unwrap();

    connection
        .execute("DROP VIEW IF EXISTS sluice_odbc_view")
        .unwrap();
    connection
        .execute("CREATE VIEW sluice_odbc_view AS SELECT 1 AS sale_id")
        .unwrap();

    // DROP TABLE on a view fails inside the swap transaction
    let next = batch((1..=3).collect());
    assert!(connection
        .replace_table("sluice_odbc_view", next.schema(), vec![next])
        .is_err());

    assert!(!observer
        .table_exists("sluice_odbc_view__staging")
        .unwrap());

    // visible to another session only when committed, so autocommit is back on
    connection
        .execute("DROP TABLE IF EXISTS sluice_odbc_after_swap")
        .unwrap();
    connection
        .execute("CREATE TABLE sluice_odbc_after_swap (id INTEGER)")
        .unwrap();
    assert!(observer.table_exists("sluice_odbc_after_swap").unwrap());

    connection
        .execute("DROP TABLE sluice_odbc_after_swap")
        .unwrap();
    connection.execute("DROP VIEW sluice_odbc_view").unwrap();
}
