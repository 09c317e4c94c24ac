use std::{collections::HashMap, error::Error, path::PathBuf, str::FromStr};

use clap::{Parser, Subcommand};
use sluice_core::stages::StageName;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod generate;
mod local_exec;

/// Sluice CLI for generating sales batches and running the sales pipeline
#[derive(Debug, Parser)]
#[command(name = "sluice", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Logging level (error, warn, info, debug, trace), RUST_LOG directives are added on top
    #[arg(long, global = true, env = "SLUICE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a synthetic raw sales file
    Generate {
        /// Destination CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of records to generate
        #[arg(short = 'n', long, default_value_t = 100_000)]
        num_records: usize,

        /// Seed for a reproducible batch
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run all four stages of a pipeline
    Run {
        /// Path to the pipeline definition
        #[arg(short, long)]
        file: PathBuf,

        /// k=v list of parameters to pass to the pipeline definition
        /// e.g. sluice run -f pipeline.yml -p data_dir=/srv/data -p ch_password=secret
        #[arg(short, long, value_parser = parse_key_val::<String, String>)]
        params: Option<Vec<(String, String)>>,
    },

    /// Run a single stage of a pipeline
    Stage {
        /// One of: load, aggregate, ensure-mirror, replicate
        #[arg(value_parser = parse_stage)]
        stage: StageName,

        /// Path to the pipeline definition
        #[arg(short, long)]
        file: PathBuf,

        /// k=v list of parameters to pass to the pipeline definition
        #[arg(short, long, value_parser = parse_key_val::<String, String>)]
        params: Option<Vec<(String, String)>>,
    },
}

fn parse_key_val<T, U>(s: &str) -> Result<(T, U), Box<dyn Error + Send + Sync + 'static>>
where
    T: std::str::FromStr,
    T::Err: Error + Send + Sync + 'static,
    U: std::str::FromStr,
    U::Err: Error + Send + Sync + 'static,
{
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}

fn parse_stage(s: &str) -> Result<StageName, String> {
    StageName::from_str(s).map_err(|e| e.to_string())
}

fn init_logging(log_level: &str, json: bool) {
    let level = Level::from_str(log_level.to_lowercase().as_str()).unwrap_or(Level::INFO);
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if json {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().compact().with_target(false))
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs);

    match args.command {
        Commands::Generate {
            output,
            num_records,
            seed,
        } => generate::generate(output, num_records, seed)?,
        Commands::Run { file, params } => {
            let params = HashMap::from_iter(params.unwrap_or_default());
            local_exec::run_local(file, params, None).await?;
        }
        Commands::Stage {
            stage,
            file,
            params,
        } => {
            let params = HashMap::from_iter(params.unwrap_or_default());
            local_exec::run_local(file, params, Some(stage)).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        let (key, value) = parse_key_val::<String, String>("dsn=Driver={PostgreSQL};a=b").unwrap();
        assert_eq!(key, "dsn");
        assert_eq!(value, "Driver={PostgreSQL};a=b");

        assert!(parse_key_val::<String, String>("no_separator").is_err());
    }

    #[test]
    fn test_stage_subcommand() {
        let args = Args::try_parse_from([
            "sluice",
            "stage",
            "ensure-mirror",
            "-f",
            "pipeline.yml",
            "-p",
            "data_dir=/tmp",
        ])
        .unwrap();

        match args.command {
            Commands::Stage {
                stage,
                file,
                params,
            } => {
                assert_eq!(stage, StageName::EnsureMirror);
                assert_eq!(file, PathBuf::from("pipeline.yml"));
                assert_eq!(
                    params,
                    Some(vec![("data_dir".to_string(), "/tmp".to_string())])
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        assert!(Args::try_parse_from(["sluice", "stage", "publish", "-f", "p.yml"]).is_err());
    }

    #[test]
    fn test_generate_defaults() {
        let args = Args::try_parse_from(["sluice", "generate", "-o", "sales.csv"]).unwrap();

        assert_eq!(args.log_level, "info");
        match args.command {
            Commands::Generate {
                num_records, seed, ..
            } => {
                assert_eq!(num_records, 100_000);
                assert_eq!(seed, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
