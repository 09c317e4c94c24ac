//! Synthetic sales batch generator.

use std::{fs::File, path::Path};

use chrono::{Duration, NaiveDate, Utc};
use datafusion::arrow::csv::WriterBuilder;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use sluice_schemas::GeneratorConfig;
use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::model::{raw_records_batch, RawSaleRecord};

fn check_range(name: &str, low: i64, high: i64) -> Result<()> {
    if low > high {
        return Err(Error::InvalidConfig(format!(
            "{name} range {low}..={high} is empty"
        )));
    }
    Ok(())
}

/// Draw `config.num_records` sales dated within `lookback_days` before `today`.
///
/// Ids are sequential starting at 1, every other field is drawn uniformly.
/// The same seed and `today` always produce the same records.
pub fn generate_records(config: &GeneratorConfig, today: NaiveDate) -> Result<Vec<RawSaleRecord>> {
    check_range("customer_id", 1, i64::from(config.max_customer_id))?;
    check_range("product_id", 1, i64::from(config.max_product_id))?;
    check_range("quantity", 1, i64::from(config.max_quantity))?;
    check_range("price", i64::from(config.min_price), i64::from(config.max_price))?;
    check_range("lookback_days", 0, config.lookback_days)?;
    if config.regions.is_empty() {
        return Err(Error::InvalidConfig("at least one region is required".into()));
    }
    let max_sale_id = i32::try_from(config.num_records).map_err(|_| {
        Error::InvalidConfig(format!("{} records exceed the sale_id range", config.num_records))
    })?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut records = Vec::with_capacity(config.num_records);
    for sale_id in 1..=max_sale_id {
        let days_back = rng.gen_range(0..=config.lookback_days);
        let region = config
            .regions
            .choose(&mut rng)
            .cloned()
            .unwrap_or_default();

        records.push(RawSaleRecord {
            sale_id,
            customer_id: rng.gen_range(1..=config.max_customer_id),
            product_id: rng.gen_range(1..=config.max_product_id),
            quantity: rng.gen_range(1..=config.max_quantity),
            sale_date: today - Duration::days(days_back),
            price: rng.gen_range(config.min_price..=config.max_price),
            region,
        });
    }

    Ok(records)
}

/// Write records as a headed CSV file in the loader's column order
pub fn write_sales_csv(path: &Path, records: &[RawSaleRecord]) -> Result<()> {
    let batch = raw_records_batch(records)?;
    let file = File::create(path)?;

    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(&batch)?;

    Ok(())
}

/// Generate a batch dated relative to the current UTC day and write it to `path`
#[instrument(skip(config), err)]
pub fn generate_sales_file(path: &Path, config: &GeneratorConfig) -> Result<usize> {
    let records = generate_records(config, Utc::now().date_naive())?;
    write_sales_csv(path, &records)?;

    info!("Wrote {} sales records to {}", records.len(), path.display());

    Ok(records.len())
}
