//! FeatureStore integration tests
//!
//! Pipelines are loaded from YAML files on disk, sources are read from CSV,
//! and results are checked in the Parquet partitions and the shared
//! in-memory store.

mod common;

use common::write_fixtures;
use fstore_core::{Batch, Record, Value};
use fstore_runtime::ParquetSink;
use fstore_sdk::{
    builtin_handlers, Entity, FeatureSet, FeatureStore, FeatureStoreBuilder, MemoryStore,
    RunStatus, SdkError, StoreSettings, TargetConfig,
};
use std::path::Path;
use std::sync::Arc;

async fn build_store(dir: &Path, memory: Arc<MemoryStore>) -> anyhow::Result<FeatureStore> {
    let pipeline = write_fixtures(dir)?;
    let store = FeatureStoreBuilder::new()
        .with_settings(StoreSettings::default().with_store_root(dir.join("store")))
        .with_pipeline_file(pipeline)
        .with_memory_store(memory)
        .with_handlers(builtin_handlers())
        .build()
        .await?;
    Ok(store)
}

#[tokio::test]
async fn test_pipeline_runs_every_sourced_feature_set() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let memory = Arc::new(MemoryStore::new());
    let store = build_store(dir.path(), memory.clone()).await?;

    let reports = store.run(None).await?;
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.status() == RunStatus::Succeeded));

    let transactions = &reports[0];
    assert_eq!(transactions.feature_set, "transactions");
    assert_eq!(transactions.input_rows, 4);
    assert_eq!(transactions.vocabulary_misses.get("category"), Some(&1));

    // one key per entity in each feature set
    assert_eq!(memory.len().await, 4);

    let stored = ParquetSink::new("check", dir.path().join("store/transactions")).read_all()?;
    assert_eq!(stored.len(), 4);

    let c1 = store
        .get_latest_feature_vector("transactions", "C1")
        .await?
        .expect("C1 stored");
    assert_eq!(c1.number("amount_sum_2h"), Some(5.0));
    assert_eq!(c1.number("amount_max_2h"), Some(5.0));
    assert_eq!(c1.number("category_es_food"), Some(1.0));
    assert_eq!(c1.get("age"), Some(&Value::from("4")));

    let c2 = store
        .get_latest_feature_vector("transactions", "C2")
        .await?
        .expect("C2 stored");
    assert_eq!(c2.get("age_mapped"), Some(&Value::from("0")));
    assert_eq!(c2.number("category_es_food"), Some(0.0));
    assert_eq!(c2.number("category_es_tech"), Some(0.0));

    let label = store
        .get_latest_feature_vector("labels", "C2")
        .await?
        .expect("label stored");
    assert_eq!(label.number("label"), Some(1.0));
    assert_eq!(label.features.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_trailing_sums_follow_timestamps_not_file_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = build_store(dir.path(), Arc::new(MemoryStore::new())).await?;

    let report = store.ingest_source("transactions").await?;
    let sums: Vec<(String, f64)> = report
        .records()
        .iter()
        .map(|r| (r.entity_key.clone(), r.number("amount_sum_2h").unwrap_or(f64::NAN)))
        .collect();

    assert!(sums.contains(&("C1".to_string(), 10.0)));
    assert!(sums.contains(&("C1".to_string(), 30.0)));
    assert!(sums.contains(&("C1".to_string(), 5.0)));
    assert!(sums.contains(&("C2".to_string(), 7.0)));
    Ok(())
}

#[tokio::test]
async fn test_only_runs_the_named_feature_set() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let memory = Arc::new(MemoryStore::new());
    let store = build_store(dir.path(), memory.clone()).await?;

    let reports = store.run(Some("labels")).await?;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].feature_set, "labels");
    assert_eq!(memory.len().await, 2);
    assert!(!dir.path().join("store/transactions").exists());

    assert!(matches!(
        store.run(Some("missing")).await,
        Err(SdkError::UnknownFeatureSet(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_missing_handler_fails_the_build() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let pipeline = write_fixtures(dir.path())?;
    let result = FeatureStoreBuilder::new()
        .with_pipeline_file(pipeline)
        .build()
        .await;
    assert!(matches!(result, Err(SdkError::ConfigError(_))));
    Ok(())
}

fn record(source: &str, minute: u32, extra: Option<(&str, f64)>) -> Record {
    let mut r = Record::new();
    r.insert("source".to_string(), Value::from(source));
    r.insert(
        "timestamp".to_string(),
        Value::from(format!("2024-01-01 00:{:02}:00", minute)),
    );
    r.insert("amount".to_string(), Value::Number(f64::from(minute)));
    if let Some((column, value)) = extra {
        r.insert(column.to_string(), Value::Number(value));
    }
    r
}

#[tokio::test]
async fn test_concurrent_runs_on_one_feature_set_are_serialized() -> anyhow::Result<()> {
    let store = FeatureStoreBuilder::new()
        .add_feature_set(
            FeatureSet::new("payments", Entity::new("source"), "timestamp"),
            vec![TargetConfig::Memory {
                name: "online".to_string(),
            }],
        )
        .build()
        .await?;

    let first = Batch::new(vec![record("A", 1, None)]);
    let second = Batch::new(vec![record("A", 2, Some(("tip", 1.0)))]);

    let (a, b) = tokio::join!(
        store.ingest("payments", first),
        store.ingest("payments", second)
    );
    assert_eq!(a?.output_rows, 1);
    assert_eq!(b?.output_rows, 1);

    // the column added by the second batch is one additive evolution
    assert_eq!(store.version("payments").await?, 2);
    let schema = store.schema("payments").await?.expect("schema inferred");
    assert!(schema.contains("tip"));
    Ok(())
}
