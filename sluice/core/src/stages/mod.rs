//! The four pipeline stages and their shared contract.

use std::{fmt, str::FromStr, sync::OnceLock};

use async_trait::async_trait;
use regex::Regex;
use sluice_schemas::Pipeline;

use crate::error::{Error, Result};
use crate::store::Connections;

pub mod aggregate;
pub mod load;
pub mod mirror;
pub mod replicate;

pub use aggregate::{aggregate_sales, Aggregator};
pub use load::{cast_record, read_sales_file, Loader};
pub use mirror::{mirror_table_ddl, MirrorSchemaManager};
pub use replicate::Replicator;

/// Stage identifiers in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageName {
    Load,
    Aggregate,
    EnsureMirror,
    Replicate,
}

impl StageName {
    pub const ALL: [StageName; 4] = [
        StageName::Load,
        StageName::Aggregate,
        StageName::EnsureMirror,
        StageName::Replicate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Load => "load",
            StageName::Aggregate => "aggregate",
            StageName::EnsureMirror => "ensure_mirror",
            StageName::Replicate => "replicate",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "load" => Ok(StageName::Load),
            "aggregate" => Ok(StageName::Aggregate),
            "ensure_mirror" | "mirror" => Ok(StageName::EnsureMirror),
            "replicate" => Ok(StageName::Replicate),
            other => Err(Error::InvalidConfig(format!("unknown stage '{other}'"))),
        }
    }
}

/// Outcome of a successful stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Rows written by the stage, zero for schema-only stages
    pub rows: u64,
}

/// Trait for executing a stage against a pair of store sessions
#[async_trait]
pub trait StageProvider: Send + Sync {
    fn name(&self) -> StageName;

    /// Execute the stage. Every stage may be re-run after a failure.
    async fn execute(&self, connections: &Connections) -> Result<StageReport>;
}

/// Check that `name` can be spliced into SQL as an unquoted table name
pub fn validate_table_name(name: &str) -> Result<&str> {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();

    let regex = IDENTIFIER
        .get_or_init(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("invalid regex"));

    if regex.is_match(name) {
        Ok(name)
    } else {
        Err(Error::InvalidConfig(format!(
            "'{name}' is not a valid table name"
        )))
    }
}

/// Build the stage `name` from the pipeline definition
pub fn build_stage(name: StageName, pipeline: &Pipeline) -> Result<Box<dyn StageProvider>> {
    let tables = &pipeline.tables;

    let stage: Box<dyn StageProvider> = match name {
        StageName::Load => Box::new(Loader::new(
            pipeline.input.clone(),
            validate_table_name(&tables.sales)?,
        )),
        StageName::Aggregate => Box::new(Aggregator::new(
            validate_table_name(&tables.sales)?,
            validate_table_name(&tables.aggregate)?,
        )),
        StageName::EnsureMirror => Box::new(MirrorSchemaManager::new(validate_table_name(
            &tables.mirror,
        )?)),
        StageName::Replicate => Box::new(Replicator::new(
            validate_table_name(&tables.aggregate)?,
            validate_table_name(&tables.mirror)?,
            pipeline.replication.chunk_rows,
        )?),
    };

    Ok(stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("load", StageName::Load)]
    #[case("aggregate", StageName::Aggregate)]
    #[case("ensure-mirror", StageName::EnsureMirror)]
    #[case("ENSURE_MIRROR", StageName::EnsureMirror)]
    #[case("replicate", StageName::Replicate)]
    fn test_stage_name_parsing(#[case] input: &str, #[case] expected: StageName) {
        assert_eq!(input.parse::<StageName>().unwrap(), expected);
    }

    #[test]
    fn test_stage_order() {
        let mut shuffled = vec![StageName::Replicate, StageName::Load, StageName::EnsureMirror];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![StageName::Load, StageName::EnsureMirror, StageName::Replicate]
        );
    }

    #[rstest]
    #[case("sales_data", true)]
    #[case("_tmp1", true)]
    #[case("1sales", false)]
    #[case("sales; DROP TABLE x", false)]
    #[case("", false)]
    fn test_validate_table_name(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(validate_table_name(name).is_ok(), valid);
    }
}
