//! Builder pattern for FeatureStore

use crate::config::{FeatureSetConfig, PipelineConfig, StepKind, StoreSettings, TargetConfig};
use crate::error::{Result, SdkError};
use crate::store::{FeatureStore, RegisteredSet};
use fstore_runtime::{
    BatchHandler, Entity, FeatureSet, HandlerRegistry, IngestionCoordinator, KeyValueSink,
    KeyValueStore, MemoryStore, ParquetSink, Sink, TransformGraph, TransformStep,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builder for FeatureStore
///
/// # Example
///
/// ```rust,ignore
/// use fstore_sdk::{builtin_handlers, FeatureStoreBuilder, StoreSettings};
///
/// let store = FeatureStoreBuilder::new()
///     .with_settings(StoreSettings::default().with_store_root("./store"))
///     .with_pipeline_file("pipelines/fraud.yaml")
///     .with_handlers(builtin_handlers())
///     .build()
///     .await?;
///
/// let reports = store.run(None).await?;
/// ```
pub struct FeatureStoreBuilder {
    settings: StoreSettings,
    pipeline: Option<PipelineConfig>,
    pipeline_file: Option<PathBuf>,
    handlers: HandlerRegistry,
    memory_store: Option<Arc<MemoryStore>>,
    extra_sets: Vec<(FeatureSet, Vec<TargetConfig>)>,
}

impl FeatureStoreBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            settings: StoreSettings::default(),
            pipeline: None,
            pipeline_file: None,
            handlers: HandlerRegistry::new(),
            memory_store: None,
            extra_sets: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: StoreSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use an already parsed pipeline
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Load the pipeline from a YAML file at build time
    pub fn with_pipeline_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pipeline_file = Some(path.into());
        self
    }

    /// Make a handler available to `custom` steps
    pub fn register_handler(
        mut self,
        name: impl Into<String>,
        handler: impl BatchHandler + 'static,
    ) -> Self {
        self.handlers.register(name, handler);
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Share an in-memory key-value store with the caller; `memory`
    /// targets write into it
    pub fn with_memory_store(mut self, store: Arc<MemoryStore>) -> Self {
        self.memory_store = Some(store);
        self
    }

    /// Register a feature set built in code
    pub fn add_feature_set(mut self, set: FeatureSet, targets: Vec<TargetConfig>) -> Self {
        self.extra_sets.push((set, targets));
        self
    }

    fn load_pipeline(&self) -> Result<Option<PipelineConfig>> {
        match (&self.pipeline, &self.pipeline_file) {
            (Some(pipeline), _) => Ok(Some(pipeline.clone())),
            (None, Some(path)) => PipelineConfig::from_file(path).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Build every configured feature set without connecting to any target.
    ///
    /// Returns the feature set names in definition order.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if let Some(pipeline) = self.load_pipeline()? {
            for config in &pipeline.feature_sets {
                let set = feature_set_from_config(config, &self.handlers)?;
                names.push(set.name().to_string());
            }
        }
        for (set, _) in &self.extra_sets {
            set.validate()?;
            names.push(set.name().to_string());
        }
        Ok(names)
    }

    /// Build the store, connecting every target
    pub async fn build(self) -> Result<FeatureStore> {
        let pipeline = self.load_pipeline()?;
        let memory = self.memory_store.clone().unwrap_or_default();
        let mut targets = TargetFactory {
            settings: &self.settings,
            memory,
            remote: HashMap::new(),
        };

        let mut sets: IndexMap<String, RegisteredSet> = IndexMap::new();

        if let Some(pipeline) = &pipeline {
            for config in &pipeline.feature_sets {
                let set = feature_set_from_config(config, &self.handlers)?;
                let source = config.source.clone().map(|mut source| {
                    source.path = pipeline.resolve(&source.path);
                    source
                });
                let registered = targets.register(set, &config.targets, source).await?;
                sets.insert(config.name.clone(), registered);
            }
        }

        for (set, target_configs) in self.extra_sets {
            set.validate()?;
            let name = set.name().to_string();
            if sets.contains_key(&name) {
                return Err(SdkError::ConfigError(format!(
                    "feature set '{}' is defined twice",
                    name
                )));
            }
            let registered = targets.register(set, &target_configs, None).await?;
            sets.insert(name, registered);
        }

        let mut coordinator = IngestionCoordinator::new();
        if let Some(secs) = self.settings.sink_timeout_secs {
            coordinator = coordinator.with_sink_timeout(Duration::from_secs(secs));
        }

        info!(feature_sets = sets.len(), "feature store built");
        Ok(FeatureStore::new(sets, coordinator, self.settings))
    }
}

impl Default for FeatureStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a runtime feature set from its configuration, validating every step
/// and aggregation
pub fn feature_set_from_config(
    config: &FeatureSetConfig,
    handlers: &HandlerRegistry,
) -> Result<FeatureSet> {
    let mut entity = Entity::new(&config.entity);
    if let Some(column) = &config.entity_column {
        entity = entity.with_key_column(column);
    }

    let mut graph = TransformGraph::new();
    for step in &config.steps {
        let runtime_step: TransformStep = match &step.kind {
            StepKind::MapValues(s) => s.clone().into(),
            StepKind::OneHotEncoder(s) => s.clone().into(),
            StepKind::DateExtractor(s) => s.clone().into(),
            StepKind::Custom { handler } => handlers
                .get(handler)
                .ok_or_else(|| {
                    SdkError::ConfigError(format!(
                        "feature set '{}': no handler registered as '{}' (known: {:?})",
                        config.name,
                        handler,
                        handlers.names()
                    ))
                })?
                .into(),
        };
        graph = match &step.name {
            Some(name) => graph.to_named(name.clone(), runtime_step),
            None => graph.to(runtime_step),
        };
    }

    let mut set = FeatureSet::new(&config.name, entity, &config.timestamp_key).with_graph(graph);
    if let Some(description) = &config.description {
        set = set.description(description);
    }
    for spec in &config.aggregations {
        set.add_aggregation(spec.clone())?;
    }
    set.validate()?;
    Ok(set)
}

struct TargetFactory<'a> {
    settings: &'a StoreSettings,
    memory: Arc<MemoryStore>,
    /// One connection per remote URL
    #[cfg_attr(not(feature = "redis"), allow(dead_code))]
    remote: HashMap<String, Arc<dyn KeyValueStore>>,
}

impl TargetFactory<'_> {
    async fn register(
        &mut self,
        set: FeatureSet,
        configs: &[TargetConfig],
        source: Option<crate::config::SourceConfig>,
    ) -> Result<RegisteredSet> {
        let mut sinks: Vec<Arc<dyn Sink>> = Vec::with_capacity(configs.len());
        let mut lookups = Vec::new();

        for config in configs {
            match config {
                TargetConfig::Parquet { name, path, mode } => {
                    let path = if path.is_relative() {
                        self.settings.store_root.join(path)
                    } else {
                        path.clone()
                    };
                    sinks.push(Arc::new(ParquetSink::new(name, path).with_mode(*mode)));
                }
                TargetConfig::Memory { name } => {
                    let store: Arc<dyn KeyValueStore> = self.memory.clone();
                    let sink = Arc::new(
                        KeyValueSink::new(name, store).with_namespace(&self.settings.namespace),
                    );
                    lookups.push(Arc::clone(&sink));
                    sinks.push(sink);
                }
                TargetConfig::Redis { name, url } => {
                    let url = url
                        .clone()
                        .or_else(|| self.settings.redis_url.clone())
                        .ok_or_else(|| {
                            SdkError::ConfigError(format!(
                                "feature set '{}': redis target '{}' has no url and no default is set",
                                set.name(),
                                name
                            ))
                        })?;
                    let store = self.remote_store(name, &url).await?;
                    let sink = Arc::new(
                        KeyValueSink::new(name, store).with_namespace(&self.settings.namespace),
                    );
                    lookups.push(Arc::clone(&sink));
                    sinks.push(sink);
                }
            }
        }

        Ok(RegisteredSet::new(set, sinks, lookups, source))
    }

    #[cfg(feature = "redis")]
    async fn remote_store(&mut self, _name: &str, url: &str) -> Result<Arc<dyn KeyValueStore>> {
        if let Some(store) = self.remote.get(url) {
            return Ok(Arc::clone(store));
        }
        let store: Arc<dyn KeyValueStore> = Arc::new(fstore_runtime::RedisStore::connect(url).await?);
        self.remote.insert(url.to_string(), Arc::clone(&store));
        Ok(store)
    }

    #[cfg(not(feature = "redis"))]
    async fn remote_store(&mut self, name: &str, _url: &str) -> Result<Arc<dyn KeyValueStore>> {
        Err(SdkError::ConfigError(format!(
            "redis target '{}' requires building with the `redis` feature",
            name
        )))
    }
}
