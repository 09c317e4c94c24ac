//! Idempotent creation of the analytical mirror table.

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{StageName, StageProvider, StageReport};
use crate::error::Result;
use crate::store::Connections;

/// Creates the mirror table in the analytical store when it is absent.
///
/// An existing mirror is left untouched, whatever it contains.
#[derive(Debug, Clone)]
pub struct MirrorSchemaManager {
    table: String,
}

impl MirrorSchemaManager {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

/// DDL for the append-only mirror, ordered by import time then product
pub fn mirror_table_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    product_id Int32,
    region String,
    num_of_sales Int64,
    total_sum Int64,
    average_sale_amount Decimal(76, 2),
    import_time DateTime DEFAULT now()
) ENGINE = MergeTree
ORDER BY (import_time, product_id)"
    )
}

#[async_trait]
impl StageProvider for MirrorSchemaManager {
    fn name(&self) -> StageName {
        StageName::EnsureMirror
    }

    #[instrument(skip_all, fields(table = %self.table), err)]
    async fn execute(&self, connections: &Connections) -> Result<StageReport> {
        connections
            .analytical()
            .command(&mirror_table_ddl(&self.table))
            .await?;

        info!("Mirror table {} is in place", self.table);

        Ok(StageReport::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_ddl() {
        let ddl = mirror_table_ddl("aggregated_sales_data");

        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS aggregated_sales_data ("));
        assert!(ddl.contains("average_sale_amount Decimal(76, 2)"));
        assert!(ddl.contains("import_time DateTime DEFAULT now()"));
        assert!(ddl.ends_with("ORDER BY (import_time, product_id)"));
    }
}
