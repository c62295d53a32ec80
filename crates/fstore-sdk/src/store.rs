//! FeatureStore - the main entry point of the SDK
//!
//! Owns every registered feature set together with its targets. Runs for the
//! same feature set are serialized behind a per-set lock; runs for different
//! feature sets may proceed concurrently.

use crate::config::{SourceConfig, StoreSettings};
use crate::error::{Result, SdkError};
use crate::source;
use fstore_core::{Batch, FeatureRecord, Schema};
use fstore_runtime::{FeatureSet, IngestReport, IngestionCoordinator, KeyValueSink, Sink};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// A feature set with its targets
pub(crate) struct RegisteredSet {
    set: Mutex<FeatureSet>,
    sinks: Vec<Arc<dyn Sink>>,
    lookups: Vec<Arc<KeyValueSink>>,
    source: Option<SourceConfig>,
}

impl RegisteredSet {
    pub(crate) fn new(
        set: FeatureSet,
        sinks: Vec<Arc<dyn Sink>>,
        lookups: Vec<Arc<KeyValueSink>>,
        source: Option<SourceConfig>,
    ) -> Self {
        Self {
            set: Mutex::new(set),
            sinks,
            lookups,
            source,
        }
    }
}

/// Feature store facade
pub struct FeatureStore {
    sets: IndexMap<String, RegisteredSet>,
    coordinator: IngestionCoordinator,
    settings: StoreSettings,
}

impl FeatureStore {
    pub(crate) fn new(
        sets: IndexMap<String, RegisteredSet>,
        coordinator: IngestionCoordinator,
        settings: StoreSettings,
    ) -> Self {
        Self {
            sets,
            coordinator,
            settings,
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Registered feature set names in definition order
    pub fn feature_set_names(&self) -> Vec<&str> {
        self.sets.keys().map(String::as_str).collect()
    }

    fn registered(&self, name: &str) -> Result<&RegisteredSet> {
        self.sets
            .get(name)
            .ok_or_else(|| SdkError::UnknownFeatureSet(name.to_string()))
    }

    /// Ingest a batch into one feature set and all of its targets
    pub async fn ingest(&self, name: &str, batch: Batch) -> Result<IngestReport> {
        let registered = self.registered(name)?;
        let mut set = registered.set.lock().await;
        let report = self
            .coordinator
            .ingest(&mut set, batch, &registered.sinks)
            .await?;
        Ok(report)
    }

    /// Load the feature set's configured source, preprocess it, and ingest it
    pub async fn ingest_source(&self, name: &str) -> Result<IngestReport> {
        let registered = self.registered(name)?;
        let options = registered.source.clone().ok_or_else(|| {
            SdkError::ConfigError(format!("feature set '{}' has no source", name))
        })?;

        let timestamp_key = registered.set.lock().await.timestamp_key().to_string();
        let batch = tokio::task::spawn_blocking(move || {
            let batch = source::read_csv(&options.path, &options)?;
            source::prepare(batch, &options, &timestamp_key)
        })
        .await
        .map_err(|e| SdkError::SourceError(format!("source task failed: {}", e)))??;

        self.ingest(name, batch).await
    }

    /// Ingest the configured source of every feature set that has one, or of
    /// `only` that set. Stops at the first fatal error.
    pub async fn run(&self, only: Option<&str>) -> Result<Vec<IngestReport>> {
        let names: Vec<&str> = match only {
            Some(name) => vec![self.registered(name).map(|_| name)?],
            None => self
                .sets
                .iter()
                .filter(|(_, r)| r.source.is_some())
                .map(|(n, _)| n.as_str())
                .collect(),
        };

        let mut reports = Vec::with_capacity(names.len());
        for name in names {
            let report = self.ingest_source(name).await?;
            if !report.failed_sinks().is_empty() {
                warn!(
                    feature_set = %name,
                    failed = ?report.failed_sinks(),
                    "run finished with failed sinks"
                );
            }
            reports.push(report);
        }
        info!(runs = reports.len(), "pipeline run finished");
        Ok(reports)
    }

    /// Re-attempt the failed targets of an earlier run
    pub async fn retry_failed(&self, name: &str, report: &IngestReport) -> Result<IngestReport> {
        let registered = self.registered(name)?;
        let _guard = registered.set.lock().await;
        let retried = self
            .coordinator
            .retry_failed(report, &registered.sinks)
            .await?;
        Ok(retried)
    }

    /// Latest feature vector for an entity key, read from the first
    /// key-value target of the feature set
    pub async fn get_latest_feature_vector(
        &self,
        name: &str,
        entity_key: &str,
    ) -> Result<Option<FeatureRecord>> {
        let registered = self.registered(name)?;
        let lookup = registered
            .lookups
            .first()
            .ok_or_else(|| SdkError::NoKeyValueTarget(name.to_string()))?;
        Ok(lookup.get_latest_feature_vector(name, entity_key).await?)
    }

    /// Latest feature vector for an entity key, read from the named
    /// key-value target of the feature set
    pub async fn get_latest_feature_vector_from(
        &self,
        name: &str,
        target: &str,
        entity_key: &str,
    ) -> Result<Option<FeatureRecord>> {
        let registered = self.registered(name)?;
        let lookup = registered
            .lookups
            .iter()
            .find(|l| l.name() == target)
            .ok_or_else(|| {
                SdkError::ConfigError(format!(
                    "feature set '{}' has no key-value target '{}'",
                    name, target
                ))
            })?;
        Ok(lookup.get_latest_feature_vector(name, entity_key).await?)
    }

    /// Current schema version of a feature set
    pub async fn version(&self, name: &str) -> Result<u32> {
        Ok(self.registered(name)?.set.lock().await.version())
    }

    /// Current schema of a feature set, `None` before the first ingestion
    pub async fn schema(&self, name: &str) -> Result<Option<Schema>> {
        Ok(self.registered(name)?.set.lock().await.schema().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FeatureStoreBuilder;
    use crate::config::TargetConfig;
    use fstore_core::{Record, Value};
    use fstore_runtime::{Entity, MemoryStore};

    fn record(source: &str, ts: &str) -> Record {
        let mut r = Record::new();
        r.insert("source".to_string(), Value::from(source));
        r.insert("timestamp".to_string(), Value::from(ts));
        r.insert("amount".to_string(), Value::Number(1.0));
        r
    }

    async fn store() -> FeatureStore {
        FeatureStoreBuilder::new()
            .with_memory_store(Arc::new(MemoryStore::new()))
            .add_feature_set(
                FeatureSet::new("transactions", Entity::new("source"), "timestamp"),
                vec![TargetConfig::Memory {
                    name: "online".to_string(),
                }],
            )
            .add_feature_set(
                FeatureSet::new("offline_only", Entity::new("source"), "timestamp"),
                Vec::new(),
            )
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_feature_set() {
        let store = store().await;
        let result = store.ingest("nope", Batch::empty()).await;
        assert!(matches!(result, Err(SdkError::UnknownFeatureSet(_))));
    }

    #[tokio::test]
    async fn test_lookup_needs_a_key_value_target() {
        let store = store().await;
        let result = store.get_latest_feature_vector("offline_only", "A").await;
        assert!(matches!(result, Err(SdkError::NoKeyValueTarget(_))));
    }

    #[tokio::test]
    async fn test_ingest_then_lookup() {
        let store = store().await;
        let batch = Batch::new(vec![
            record("A", "2024-01-01 00:00:00"),
            record("A", "2024-01-01 00:01:00"),
        ]);
        let report = store.ingest("transactions", batch).await.unwrap();
        assert_eq!(report.output_rows, 2);

        let latest = store
            .get_latest_feature_vector("transactions", "A")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.entity_key, "A");
        assert_eq!(latest.number("amount"), Some(1.0));
        assert_eq!(store.version("transactions").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lookup_from_a_named_target() {
        let store = store().await;
        let batch = Batch::new(vec![record("A", "2024-01-01 00:00:00")]);
        store.ingest("transactions", batch).await.unwrap();

        let latest = store
            .get_latest_feature_vector_from("transactions", "online", "A")
            .await
            .unwrap();
        assert_eq!(latest.unwrap().number("amount"), Some(1.0));

        assert!(matches!(
            store
                .get_latest_feature_vector_from("transactions", "parquet", "A")
                .await,
            Err(SdkError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_source_missing_is_a_config_error() {
        let store = store().await;
        assert!(matches!(
            store.ingest_source("transactions").await,
            Err(SdkError::ConfigError(_))
        ));
    }
}
