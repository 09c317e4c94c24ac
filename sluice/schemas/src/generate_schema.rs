//! Binary to generate the JSON schema for pipeline definitions
//!
//! This binary can be run with: cargo run --bin generate_schema --features schema_gen

use schemars::schema_for;
use sluice_schemas::Pipeline;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let schema = schema_for!(Pipeline);
    let schema_json = serde_json::to_string_pretty(&schema)?;

    let output_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("json_schema")
        .join("sluice.schema.json");

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(&output_path)?;
    file.write_all(schema_json.as_bytes())?;

    println!("Generated JSON schema at: {}", output_path.display());

    Ok(())
}
