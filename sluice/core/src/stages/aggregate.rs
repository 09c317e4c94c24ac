//! Per `(product_id, region)` aggregation of the sales table.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use datafusion::arrow::{
    array::{Array, AsArray, RecordBatch},
    datatypes::{DataType, Field, Float64Type, Int32Type, Schema, SchemaRef},
};
use tracing::{debug, info, instrument};

use super::{StageName, StageProvider, StageReport};
use crate::error::{Error, Result};
use crate::model::{aggregate_batch, aggregate_schema, conform_batch, AggregateRow, Decimal2};
use crate::store::Connections;

/// Rebuilds the aggregate table from the full sales table
#[derive(Debug, Clone)]
pub struct Aggregator {
    source: String,
    target: String,
}

impl Aggregator {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

fn source_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("product_id", DataType::Int32, false),
        Field::new("region", DataType::Utf8, false),
        Field::new("sale_amount", DataType::Float64, false),
    ]))
}

#[async_trait]
impl StageProvider for Aggregator {
    fn name(&self) -> StageName {
        StageName::Aggregate
    }

    #[instrument(skip_all, fields(source = %self.source, target = %self.target), err)]
    async fn execute(&self, connections: &Connections) -> Result<StageReport> {
        let relational = connections.relational();

        if !relational.table_exists(&self.source).await? {
            return Err(Error::PrecursorMissing(format!(
                "sales table '{}' does not exist, run the loader first",
                self.source
            )));
        }

        let query = format!(
            "SELECT product_id, region, sale_amount FROM {}",
            self.source
        );
        let schema = source_schema();
        let batches = relational
            .query(&query)
            .await?
            .iter()
            .map(|batch| conform_batch(batch, &schema, &self.source))
            .collect::<Result<Vec<RecordBatch>>>()?;

        let sales = batches.iter().map(|b| b.num_rows()).sum::<usize>();
        if sales == 0 {
            return Err(Error::PrecursorMissing(format!(
                "sales table '{}' is empty",
                self.source
            )));
        }

        let rows = aggregate_sales(&batches)?;
        info!("Aggregated {sales} sales into {} groups", rows.len());

        let rows = relational
            .replace_table(&self.target, aggregate_schema(), vec![aggregate_batch(&rows)?])
            .await?;

        Ok(StageReport { rows })
    }
}

#[derive(Debug, Default)]
struct Group {
    count: i64,
    sum: i128,
}

fn whole_amount(amount: f64) -> Result<i128> {
    if !amount.is_finite() || amount.fract() != 0.0 {
        return Err(Error::Fatal(format!(
            "sale_amount {amount} is not a whole number"
        )));
    }

    Ok(amount as i128)
}

/// Group `(product_id, region, sale_amount)` batches and compute count, sum and mean.
///
/// Batches must have exactly those three columns typed `Int32`, `Utf8` and `Float64`.
///
/// Rows come back ordered by `product_id`, then `region`.
pub fn aggregate_sales(batches: &[RecordBatch]) -> Result<Vec<AggregateRow>> {
    let mut groups: BTreeMap<i32, BTreeMap<String, Group>> = BTreeMap::new();

    for batch in batches {
        let layout = || Error::Fatal("sales batch is not (Int32, Utf8, Float64)".into());
        if batch.num_columns() != 3 {
            return Err(layout());
        }
        let product_ids = batch.column(0).as_primitive_opt::<Int32Type>().ok_or_else(layout)?;
        let regions = batch.column(1).as_string_opt::<i32>().ok_or_else(layout)?;
        let amounts = batch.column(2).as_primitive_opt::<Float64Type>().ok_or_else(layout)?;

        for row in 0..batch.num_rows() {
            if product_ids.is_null(row) || regions.is_null(row) || amounts.is_null(row) {
                return Err(Error::Fatal("sales row with missing values".into()));
            }

            let regions_of_product = groups.entry(product_ids.value(row)).or_default();
            let region = regions.value(row);
            if !regions_of_product.contains_key(region) {
                regions_of_product.insert(region.to_string(), Group::default());
            }

            let amount = whole_amount(amounts.value(row))?;
            if let Some(group) = regions_of_product.get_mut(region) {
                group.count += 1;
                group.sum = group
                    .sum
                    .checked_add(amount)
                    .ok_or_else(|| Error::Fatal("total_sum overflows".into()))?;
            }
        }
    }

    let mut rows = Vec::new();
    for (product_id, regions) in groups {
        for (region, group) in regions {
            let total_sum = i64::try_from(group.sum).map_err(|_| {
                Error::Fatal(format!(
                    "total_sum {} of product {product_id} in {region} exceeds 64 bits",
                    group.sum
                ))
            })?;

            rows.push(AggregateRow {
                product_id,
                average_sale_amount: Decimal2::ratio(group.sum, group.count)?,
                region,
                num_of_sales: group.count,
                total_sum,
            });
        }
    }

    debug!("Built {} aggregate rows", rows.len());

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::{ArrayRef, Float64Array, Int32Array, StringArray};

    fn sales(rows: Vec<(i32, &str, f64)>) -> RecordBatch {
        let product_ids = rows.iter().map(|r| r.0).collect::<Vec<_>>();
        let regions = rows.iter().map(|r| r.1).collect::<Vec<_>>();
        let amounts = rows.iter().map(|r| r.2).collect::<Vec<_>>();

        RecordBatch::try_from_iter(vec![
            ("product_id", Arc::new(Int32Array::from(product_ids)) as ArrayRef),
            ("region", Arc::new(StringArray::from(regions)) as ArrayRef),
            ("sale_amount", Arc::new(Float64Array::from(amounts)) as ArrayRef),
        ])
        .unwrap()
    }

    #[test]
    fn test_aggregate_groups_and_orders() {
        let batches = vec![
            sales(vec![(2, "South", 50.0), (1, "North", 100.0)]),
            sales(vec![(1, "North", 300.0), (1, "East", 7.0)]),
        ];

        let rows = aggregate_sales(&batches).unwrap();
        let keys = rows
            .iter()
            .map(|r| (r.product_id, r.region.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(keys, vec![(1, "East"), (1, "North"), (2, "South")]);

        let north = &rows[1];
        assert_eq!(north.num_of_sales, 2);
        assert_eq!(north.total_sum, 400);
        assert_eq!(north.average_sale_amount.to_string(), "200.00");

        let south = &rows[2];
        assert_eq!((south.num_of_sales, south.total_sum), (1, 50));
        assert_eq!(south.average_sale_amount.to_string(), "50.00");
    }

    #[test]
    fn test_aggregate_rounds_mean() {
        let rows = aggregate_sales(&[sales(vec![
            (1, "West", 10.0),
            (1, "West", 10.0),
            (1, "West", 11.0),
        ])])
        .unwrap();

        assert_eq!(rows[0].average_sale_amount.to_string(), "10.33");
    }

    #[test]
    fn test_aggregate_rejects_fractional_amounts() {
        let err = aggregate_sales(&[sales(vec![(1, "West", 10.5)])]).unwrap_err();
        assert!(matches!(err, Error::Fatal(_)));
    }

    #[test]
    fn test_aggregate_sums_past_32_bits() {
        let rows = aggregate_sales(&[sales(vec![
            (1, "West", 2_000_000_000.0),
            (1, "West", 2_000_000_000.0),
        ])])
        .unwrap();

        assert_eq!(rows[0].total_sum, 4_000_000_000);
        assert_eq!(rows[0].average_sale_amount.to_string(), "2000000000.00");
    }
}
