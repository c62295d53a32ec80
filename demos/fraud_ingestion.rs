//! Fraud feature ingestion demo
//!
//! This demo:
//! - Generates synthetic card transactions and account events as CSV
//! - Loads `pipelines/fraud.yaml` (transactions, events and labels)
//! - Runs every feature set into Parquet and an in-memory online store
//! - Looks up the latest feature vectors of a few customers

use fstore_demos::generate_data;
use fstore_sdk::{builtin_handlers, FeatureStoreBuilder, MemoryStore, StoreSettings};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PIPELINE: &str = include_str!("pipelines/fraud.yaml");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fstore_sdk=info,fstore_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    println!("=== Fraud Feature Ingestion Demo ===\n");

    let workdir = std::env::temp_dir().join(format!("fstore-demo-{}", std::process::id()));
    generate_data(&workdir, 42)?;
    std::fs::write(workdir.join("fraud.yaml"), PIPELINE)?;
    println!("Synthetic data written to {}\n", workdir.display());

    let online = Arc::new(MemoryStore::new());
    let store = FeatureStoreBuilder::new()
        .with_settings(StoreSettings::default().with_store_root(workdir.join("store")))
        .with_pipeline_file(workdir.join("fraud.yaml"))
        .with_memory_store(online.clone())
        .with_handlers(builtin_handlers())
        .build()
        .await?;

    for report in store.run(None).await? {
        println!(
            "--- {} (schema v{}) ---",
            report.feature_set, report.schema_version
        );
        println!("Status: {:?}", report.status());
        println!("Rows: {} in, {} out", report.input_rows, report.output_rows);
        if report.total_vocabulary_misses() > 0 {
            println!("Vocabulary misses: {:?}", report.vocabulary_misses);
        }
        for sink in &report.sinks {
            println!(
                "  {} [{}]: {} written in {}ms{}",
                sink.sink,
                sink.kind,
                sink.rows_written,
                sink.elapsed_ms,
                sink.error
                    .as_ref()
                    .map(|e| format!(" (failed: {})", e))
                    .unwrap_or_default()
            );
        }
        println!();
    }

    println!("Online store holds {} feature vectors\n", online.len().await);

    for customer in ["C0", "C1", "C2"] {
        match store.get_latest_feature_vector("transactions", customer).await? {
            Some(vector) => println!(
                "{} at {}: amount_sum_24h={:?} amount_count_24h={:?} es_food_sum_14d={:?}",
                customer,
                vector.timestamp,
                vector.number("amount_sum_24h"),
                vector.number("amount_count_24h"),
                vector.number("es_food_sum_14d"),
            ),
            None => println!("{}: no transactions in the aligned window", customer),
        }
    }

    Ok(())
}
