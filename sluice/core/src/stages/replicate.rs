//! Replication of the current aggregate into the append-only mirror.

use async_trait::async_trait;
use datafusion::arrow::{array::RecordBatch, compute::concat_batches};
use tracing::{debug, error, info, instrument, warn};

use super::{StageName, StageProvider, StageReport};
use crate::error::{Error, Result};
use crate::model::{aggregate_schema, conform_batch, MIRROR_COLUMNS};
use crate::store::Connections;

/// Copies every aggregate row into the mirror.
///
/// Rows are sent in chunks of at most `chunk_rows`. The mirror stamps each insert
/// with its own import time, so rows of one run share an import time per chunk.
#[derive(Debug, Clone)]
pub struct Replicator {
    source: String,
    mirror: String,
    chunk_rows: usize,
}

impl Replicator {
    pub fn new(
        source: impl Into<String>,
        mirror: impl Into<String>,
        chunk_rows: usize,
    ) -> Result<Self> {
        if chunk_rows == 0 {
            return Err(Error::InvalidConfig(
                "replication.chunk_rows must be at least 1".into(),
            ));
        }

        Ok(Self {
            source: source.into(),
            mirror: mirror.into(),
            chunk_rows,
        })
    }

    async fn read_aggregate(&self, connections: &Connections) -> Result<RecordBatch> {
        let relational = connections.relational();

        if !relational.table_exists(&self.source).await? {
            return Err(Error::PrecursorMissing(format!(
                "aggregate table '{}' does not exist, run the aggregator first",
                self.source
            )));
        }

        let query = format!(
            "SELECT {} FROM {} ORDER BY product_id, region",
            MIRROR_COLUMNS.join(", "),
            self.source
        );
        let schema = aggregate_schema();
        let batches = relational
            .query(&query)
            .await?
            .iter()
            .map(|batch| conform_batch(batch, &schema, &self.mirror))
            .collect::<Result<Vec<RecordBatch>>>()?;

        Ok(concat_batches(&schema, &batches)?)
    }
}

#[async_trait]
impl StageProvider for Replicator {
    fn name(&self) -> StageName {
        StageName::Replicate
    }

    #[instrument(skip_all, fields(source = %self.source, mirror = %self.mirror), err)]
    async fn execute(&self, connections: &Connections) -> Result<StageReport> {
        let aggregate = self.read_aggregate(connections).await?;
        let expected = aggregate.num_rows() as u64;

        if expected == 0 {
            warn!("Aggregate table {} is empty, nothing to replicate", self.source);
            return Ok(StageReport::default());
        }

        let analytical = connections.analytical();
        let mut written = 0u64;
        let mut offset = 0usize;

        while offset < aggregate.num_rows() {
            let length = self.chunk_rows.min(aggregate.num_rows() - offset);
            let chunk = aggregate.slice(offset, length);

            match analytical.insert(&self.mirror, &chunk, &MIRROR_COLUMNS).await {
                Ok(rows) => {
                    written += rows;
                    debug!("Replicated {written}/{expected} rows into {}", self.mirror);
                }
                Err(Error::PartialReplication {
                    written: chunk_written,
                    reason,
                    ..
                }) => {
                    written += chunk_written;
                    error!("Replication into {} stopped after {written} rows", self.mirror);
                    return Err(Error::PartialReplication {
                        table: self.mirror.clone(),
                        expected,
                        written,
                        reason,
                    });
                }
                Err(err) if written > 0 => {
                    error!("Replication into {} stopped after {written} rows", self.mirror);
                    return Err(Error::PartialReplication {
                        table: self.mirror.clone(),
                        expected,
                        written,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }

            offset += length;
        }

        if written != expected {
            return Err(Error::PartialReplication {
                table: self.mirror.clone(),
                expected,
                written,
                reason: "store acknowledged fewer rows than sent".into(),
            });
        }

        info!("Replicated {written} rows into {}", self.mirror);

        Ok(StageReport { rows: written })
    }
}
