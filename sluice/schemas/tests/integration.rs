//! Integration tests for sluice schemas
//!
//! Tests defaults, aliases and the supported configuration formats.

use rstest::rstest;
use sluice_schemas::{
    AnalyticalStoreConfig, GeneratorConfig, Pipeline, ProgressEvent, RelationalStoreConfig,
};

#[test]
fn test_minimal_pipeline_defaults() {
    let json = r#"{ "input": { "location": "/tmp/data.csv" } }"#;

    let pipeline: Pipeline = serde_json::from_str(json).unwrap();

    assert_eq!(pipeline.version, "v1");
    assert_eq!(pipeline.input.delimiter, ',');
    assert!(pipeline.input.has_header);
    assert_eq!(pipeline.tables.sales, "sales_data");
    assert_eq!(pipeline.tables.aggregate, "aggregated_sales_data");
    assert_eq!(pipeline.tables.mirror, "aggregated_sales_data");
    assert_eq!(pipeline.replication.chunk_rows, 100_000);
    assert!(pipeline.stage_timeout_secs.is_none());
    assert!(matches!(pipeline.relational, RelationalStoreConfig::Memory));
    assert!(matches!(pipeline.analytical, AnalyticalStoreConfig::Memory));
}

#[test]
fn test_full_yaml_pipeline() {
    let yaml = r#"
version: v1
input:
  path: /srv/airflow/data.csv
relational:
  type: postgres
  connection_string: "Driver={PostgreSQL Unicode};Server=db;Port=5433;Database=test;"
  batch_size: 500
analytical:
  type: clickhouse
  url: http://clickhouse:8123
  user: etl
tables:
  mirror: aggregated_sales_history
replication:
  chunk_rows: 250
stage_timeout_secs: 600
"#;

    let pipeline: Pipeline = serde_yml::from_str(yaml).unwrap();

    assert_eq!(
        pipeline.input.location.local_path().unwrap().to_str(),
        Some("/srv/airflow/data.csv")
    );
    match &pipeline.relational {
        RelationalStoreConfig::Odbc(odbc) => assert_eq!(odbc.batch_size, 500),
        other => panic!("unexpected relational store: {other:?}"),
    }
    match &pipeline.analytical {
        AnalyticalStoreConfig::Clickhouse(ch) => {
            assert_eq!(ch.username, "etl");
            assert_eq!(ch.database, "default");
            assert_eq!(ch.url.port(), Some(8123));
        }
        other => panic!("unexpected analytical store: {other:?}"),
    }
    assert_eq!(pipeline.tables.sales, "sales_data");
    assert_eq!(pipeline.tables.mirror, "aggregated_sales_history");
    assert_eq!(pipeline.replication.chunk_rows, 250);
    assert_eq!(pipeline.stage_timeout_secs, Some(600));
}

#[test]
fn test_toml_pipeline() {
    let toml_str = r#"
stage_timeout_secs = 30

[input]
location = "/tmp/sales.csv"
delimiter = ";"

[analytical]
type = "memory"
"#;

    let pipeline: Pipeline = toml::from_str(toml_str).unwrap();

    assert_eq!(pipeline.input.delimiter, ';');
    assert_eq!(pipeline.stage_timeout_secs, Some(30));
}

#[test]
fn test_pipeline_serialization_roundtrip() {
    let json = r#"{ "input": { "location": "/tmp/data.csv" }, "stage_timeout_secs": 5 }"#;
    let pipeline: Pipeline = serde_json::from_str(json).unwrap();

    let serialized = serde_json::to_string(&pipeline).unwrap();
    let parsed: Pipeline = serde_json::from_str(&serialized).unwrap();

    assert_eq!(parsed.input.location, pipeline.input.location);
    assert_eq!(parsed.tables, pipeline.tables);
    assert_eq!(parsed.stage_timeout_secs, Some(5));
}

#[rstest]
#[case(r#"{"type": "memory"}"#)]
#[case(r#"{"type": "in_memory"}"#)]
#[case(r#"{"type": "Memory"}"#)]
fn test_memory_store_aliases(#[case] json: &str) {
    let store: RelationalStoreConfig = serde_json::from_str(json).unwrap();
    assert!(matches!(store, RelationalStoreConfig::Memory));
}

#[test]
fn test_generator_defaults_match_reference_batch() {
    let config: GeneratorConfig = serde_json::from_str("{}").unwrap();

    assert_eq!(config.num_records, 100_000);
    assert_eq!(config.max_customer_id, 10_000);
    assert_eq!(config.max_product_id, 100);
    assert_eq!(config.max_quantity, 20);
    assert_eq!((config.min_price, config.max_price), (10, 1000));
    assert_eq!(config.lookback_days, 365);
    assert_eq!(config.regions, vec!["North", "South", "East", "West"]);
    assert_eq!(config, GeneratorConfig::default());
}

#[test]
fn test_progress_event_tagging() {
    let event = ProgressEvent::StageCompleted {
        stage: "aggregate".to_string(),
        position: 1,
        rows: 400,
        duration_ms: 12,
    };

    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains(r#""type":"stage_completed""#));

    let parsed: ProgressEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, event);
}
