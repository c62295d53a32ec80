//! fstore command line
//!
//! Runs, validates and queries feature pipelines defined in YAML.

mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fstore_sdk::{
    builtin_handlers, FeatureStoreBuilder, IngestReport, PipelineConfig, RunStatus, StoreSettings,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Batch feature pipeline runner
#[derive(Parser)]
#[command(name = "fstore", version, about = "Batch feature pipeline runner")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Override the store root from settings
    #[arg(long, global = true)]
    store_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the configured sources of a pipeline
    Run {
        /// Path to the pipeline YAML file
        #[arg(long)]
        config: PathBuf,
        /// Run only this feature set
        #[arg(long)]
        only: Option<String>,
    },

    /// Build every feature set of a pipeline without ingesting anything
    Validate {
        /// Path to the pipeline YAML file
        #[arg(long)]
        config: PathBuf,
    },

    /// Print the latest feature vector stored for an entity key in the
    /// feature set's redis target
    Lookup {
        /// Path to the pipeline YAML file
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        feature_set: String,
        /// Entity key
        #[arg(long)]
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let mut settings = settings::load()?;
    if let Some(root) = cli.store_root.clone() {
        settings.store_root = root;
    }

    match cli.command {
        Commands::Run { config, only } => run(settings, config, only, cli.output).await,
        Commands::Validate { config } => validate(config, cli.output),
        Commands::Lookup {
            config,
            feature_set,
            key,
        } => lookup(settings, config, &feature_set, &key).await,
    }
}

/// Initialize tracing subscriber
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fstore_cli=info,fstore_sdk=info,fstore_runtime=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}

async fn run(
    settings: StoreSettings,
    config: PathBuf,
    only: Option<String>,
    output: OutputFormat,
) -> Result<()> {
    let store = FeatureStoreBuilder::new()
        .with_settings(settings)
        .with_pipeline_file(&config)
        .with_handlers(builtin_handlers())
        .build()
        .await
        .with_context(|| format!("Failed to load pipeline {}", config.display()))?;

    let reports = store.run(only.as_deref()).await?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => reports.iter().for_each(print_report),
    }

    let failed = reports
        .iter()
        .filter(|r| r.status() != RunStatus::Succeeded)
        .count();
    if failed > 0 {
        anyhow::bail!("{} of {} runs had failed sinks", failed, reports.len());
    }
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!(
        "{} run {} (schema v{}): {:?}, {} rows in, {} rows out",
        report.feature_set,
        report.run_id,
        report.schema_version,
        report.status(),
        report.input_rows,
        report.output_rows
    );
    for (column, misses) in &report.vocabulary_misses {
        println!("  vocabulary misses in {}: {}", column, misses);
    }
    for sink in &report.sinks {
        match &sink.error {
            None => println!(
                "  {} [{}] wrote {} in {}ms",
                sink.sink, sink.kind, sink.rows_written, sink.elapsed_ms
            ),
            Some(error) => println!("  {} [{}] FAILED: {}", sink.sink, sink.kind, error),
        }
    }
}

fn validate(config: PathBuf, output: OutputFormat) -> Result<()> {
    let names = FeatureStoreBuilder::new()
        .with_pipeline_file(&config)
        .with_handlers(builtin_handlers())
        .validate()
        .with_context(|| format!("Invalid pipeline {}", config.display()))?;

    info!(feature_sets = names.len(), "pipeline is valid");
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string(&names)?),
        OutputFormat::Text => names.iter().for_each(|n| println!("{}", n)),
    }
    Ok(())
}

async fn lookup(settings: StoreSettings, config: PathBuf, feature_set: &str, key: &str) -> Result<()> {
    let pipeline = PipelineConfig::from_file(&config)
        .with_context(|| format!("Failed to load pipeline {}", config.display()))?;
    let target = lookup_target(&pipeline, feature_set)?;

    let store = FeatureStoreBuilder::new()
        .with_settings(settings)
        .with_pipeline(pipeline)
        .with_handlers(builtin_handlers())
        .build()
        .await?;

    match store
        .get_latest_feature_vector_from(feature_set, &target, key)
        .await?
    {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => anyhow::bail!("No features stored for '{}' in '{}'", key, feature_set),
    }
    Ok(())
}

/// Name of the key-value target a lookup reads from. Memory targets are
/// empty in a fresh process, so only a redis target qualifies.
fn lookup_target(pipeline: &PipelineConfig, feature_set: &str) -> Result<String> {
    let config = pipeline
        .feature_set(feature_set)
        .ok_or_else(|| anyhow::anyhow!("Unknown feature set '{}'", feature_set))?;
    config
        .targets
        .iter()
        .find(|t| t.is_persistent_key_value())
        .map(|t| t.name().to_string())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Feature set '{}' has no redis target; lookup needs a redis target because memory targets do not outlive the run that wrote them",
                feature_set
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "fstore", "run", "--config", "pipeline.yaml", "--only", "labels", "--output", "json",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Run { config, only } => {
                assert_eq!(config, PathBuf::from("pipeline.yaml"));
                assert_eq!(only.as_deref(), Some("labels"));
            }
            _ => panic!("expected run"),
        }
    }

    const PIPELINE: &str = r#"
feature_sets:
  - name: transactions
    entity: source
    targets:
      - kind: memory
        name: online
      - kind: redis
        name: shared
        url: redis://localhost:6379
  - name: labels
    entity: source
    targets:
      - kind: memory
        name: labels_online
"#;

    #[test]
    fn test_lookup_reads_the_redis_target() {
        let pipeline = PipelineConfig::from_yaml_str(PIPELINE).unwrap();
        assert_eq!(lookup_target(&pipeline, "transactions").unwrap(), "shared");
    }

    #[test]
    fn test_lookup_rejects_memory_only_feature_sets() {
        let pipeline = PipelineConfig::from_yaml_str(PIPELINE).unwrap();
        let err = lookup_target(&pipeline, "labels").unwrap_err();
        assert!(err.to_string().contains("no redis target"));

        assert!(lookup_target(&pipeline, "events").is_err());
    }

    #[test]
    fn test_lookup_requires_a_key() {
        assert!(Cli::try_parse_from([
            "fstore", "lookup", "--config", "p.yaml", "--feature-set", "transactions",
        ])
        .is_err());
    }
}
