//! Shared helpers for the sluice core integration tests.
//!
//! Builds raw sales files and a pipeline wired to the in-memory stores.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::compute::concat_batches;
use sluice_core::model::{aggregate_schema, mirror_schema};
use sluice_core::pipeline::ProgressTracker;
use sluice_core::store::{Connections, MemoryAnalyticalStore, MemoryRelationalStore, RelationalStore};
use sluice_schemas::{InputConfig, Location, Pipeline, ProgressEvent};
use tempfile::TempDir;

pub const HEADER: &str = "sale_id,customer_id,product_id,quantity,sale_date,price,region";

/// One raw sale: product, region, quantity, price
pub type Sale = (i32, &'static str, i32, i32);

/// Three sales making up a two-group aggregate:
/// product 1 in North sells for 100 and 300, product 2 in South for 50
pub fn reference_sales() -> Vec<Sale> {
    vec![(1, "North", 1, 100), (1, "North", 3, 100), (2, "South", 5, 10)]
}

/// Write `sales` with a header row, ids counting from 1
pub fn write_sales_file<P: AsRef<Path>>(path: P, sales: &[Sale]) -> PathBuf {
    let mut file = File::create(&path).unwrap();
    writeln!(file, "{HEADER}").unwrap();

    for (index, (product_id, region, quantity, price)) in sales.iter().enumerate() {
        writeln!(
            file,
            "{},{},{product_id},{quantity},2024-03-{:02},{price},{region}",
            index + 1,
            100 + index,
            (index % 28) + 1
        )
        .unwrap();
    }

    file.flush().unwrap();
    path.as_ref().to_path_buf()
}

/// Memory stores shared across several runs of one test
pub struct TestStores {
    pub relational: Arc<MemoryRelationalStore>,
    pub analytical: Arc<MemoryAnalyticalStore>,
}

impl TestStores {
    pub fn new() -> Self {
        Self {
            relational: Arc::new(MemoryRelationalStore::default()),
            analytical: Arc::new(MemoryAnalyticalStore::default()),
        }
    }

    /// A fresh session pair over the shared stores
    pub fn connections(&self) -> Connections {
        Connections::new(self.relational.clone(), self.analytical.clone())
    }

    pub async fn relational_table(&self, sql: &str) -> Vec<RecordBatch> {
        self.relational.query(sql).await.unwrap()
    }

    /// All mirror rows as one batch
    pub fn mirror(&self, table: &str) -> RecordBatch {
        let batches = self.analytical.batches(table).unwrap();
        concat_batches(&mirror_schema(), &batches).unwrap()
    }

    /// Mirror rows without `import_time`, comparable to the aggregate table
    pub fn mirror_aggregate_columns(&self, table: &str) -> RecordBatch {
        let mirror = self.mirror(table);
        let projected = mirror.project(&[0, 1, 2, 3, 4]).unwrap();
        assert_eq!(projected.schema(), aggregate_schema());
        projected
    }
}

/// Test workspace holding the raw sales file
pub struct Workspace {
    pub dir: TempDir,
    pub input: PathBuf,
}

impl Workspace {
    pub fn new(sales: &[Sale]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sales_file(dir.path().join("sales.csv"), sales);
        Self { dir, input }
    }

    pub fn rewrite(&self, sales: &[Sale]) {
        write_sales_file(&self.input, sales);
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::builder()
            .input(
                InputConfig::builder()
                    .location(Location::try_from(self.input.as_path()).unwrap())
                    .build(),
            )
            .build()
    }
}

/// Tracker keeping every event for later assertions
#[derive(Debug, Default)]
pub struct RecordingTracker {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingTracker {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressTracker for RecordingTracker {
    fn on_progress(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
