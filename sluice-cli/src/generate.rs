use std::path::PathBuf;

use anyhow::Context;
use sluice_core::generator::generate_sales_file;
use sluice_schemas::GeneratorConfig;
use tracing::{debug, info};

pub fn generate(output: PathBuf, num_records: usize, seed: Option<u64>) -> anyhow::Result<()> {
    let config = GeneratorConfig::builder()
        .num_records(num_records)
        .maybe_seed(seed)
        .build();
    debug!("Generator configuration: {config:?}");

    let written = generate_sales_file(&output, &config)
        .with_context(|| format!("failed to generate sales file {}", output.display()))?;

    info!("📦 Generated {written} sales records");
    Ok(())
}
