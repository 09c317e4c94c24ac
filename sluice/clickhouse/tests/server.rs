//! Tests against a live ClickHouse server on localhost:8123.
//!
//! Run with: cargo test -p sluice-clickhouse --features clickhouse_tests

#![cfg(feature = "clickhouse_tests")]

use std::sync::Arc;

use datafusion::arrow::array::{
    ArrayRef, Decimal256Array, Int32Array, Int64Array, RecordBatch, StringArray,
};
use datafusion::arrow::datatypes::i256;
use sluice_clickhouse::ClickHouseClient;
use sluice_schemas::ClickHouseConfig;

fn client() -> ClickHouseClient {
    let config = ClickHouseConfig::builder()
        .url("http://localhost:8123".try_into().unwrap())
        .build();

    ClickHouseClient::new(&config).unwrap()
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_insert_fills_default_columns() {
    let client = client();
    client.ping().await.unwrap();

    client
        .command("DROP TABLE IF EXISTS sluice_client_test")
        .await
        .unwrap();
    client
        .command(
            "CREATE TABLE sluice_client_test (
                product_id Int32,
                region String,
                num_of_sales Int64,
                total_sum Int64,
                average_sale_amount Decimal(76, 2),
                import_time DateTime DEFAULT now()
            ) ENGINE = MergeTree() ORDER BY (import_time, product_id)",
        )
        .await
        .unwrap();

    let averages = Decimal256Array::from(vec![i256::from_i128(20_000), i256::from_i128(5_000)])
        .with_precision_and_scale(76, 2)
        .unwrap();
    let batch = RecordBatch::try_from_iter(vec![
        ("product_id", Arc::new(Int32Array::from(vec![1, 2])) as ArrayRef),
        (
            "region",
            Arc::new(StringArray::from(vec!["North", "South"])) as ArrayRef,
        ),
        ("num_of_sales", Arc::new(Int64Array::from(vec![2, 1])) as ArrayRef),
        ("total_sum", Arc::new(Int64Array::from(vec![400, 50])) as ArrayRef),
        ("average_sale_amount", Arc::new(averages) as ArrayRef),
    ])
    .unwrap();

    let written = client
        .insert(
            "sluice_client_test",
            &[
                "product_id",
                "region",
                "num_of_sales",
                "total_sum",
                "average_sale_amount",
            ],
            &batch,
        )
        .await
        .unwrap();
    assert_eq!(written, 2);

    let count = client
        .query_text("SELECT count() FROM sluice_client_test WHERE import_time > 0")
        .await
        .unwrap();
    assert_eq!(count.trim(), "2");

    let rows = client
        .query_text(
            "SELECT product_id, total_sum, toInt64(average_sale_amount * 100) FROM sluice_client_test \
             ORDER BY product_id FORMAT TSV",
        )
        .await
        .unwrap();
    assert_eq!(rows, "1\t400\t20000\n2\t50\t5000\n");

    let err = client
        .insert("sluice_client_missing", &["product_id"], &batch)
        .await
        .unwrap_err();
    assert!(err.is_unknown_table());
}
