//! Configuration types for FeatureStore
//!
//! A pipeline is a YAML document listing feature sets. Each feature set
//! names its entity, timestamp column, source, transform steps,
//! aggregations and targets.

use crate::error::{Result, SdkError};
use fstore_core::TimeSpan;
use fstore_runtime::{AggregationSpec, DateExtractor, MapValues, OneHotEncoder, WriteMode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Process-level settings, threaded explicitly into the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Root that relative parquet target paths resolve against
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,

    /// Default URL for `redis` targets that do not name one
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix for key-value keys; empty for none
    #[serde(default)]
    pub namespace: String,

    /// Per-sink write timeout in seconds
    #[serde(default)]
    pub sink_timeout_secs: Option<u64>,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("store")
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            store_root: default_store_root(),
            redis_url: None,
            namespace: String::new(),
            sink_timeout_secs: None,
        }
    }
}

impl StoreSettings {
    pub fn with_store_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.store_root = root.into();
        self
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_sink_timeout_secs(mut self, secs: u64) -> Self {
        self.sink_timeout_secs = Some(secs);
        self
    }
}

/// Top-level pipeline document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub feature_sets: Vec<FeatureSetConfig>,

    /// Directory that relative source paths resolve against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a pipeline file; its directory becomes the base for source paths
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SdkError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Structural checks that need no runtime objects
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for set in &self.feature_sets {
            if set.name.trim().is_empty() {
                return Err(SdkError::ConfigError(
                    "feature set name cannot be empty".to_string(),
                ));
            }
            if !names.insert(set.name.as_str()) {
                return Err(SdkError::ConfigError(format!(
                    "feature set '{}' is defined twice",
                    set.name
                )));
            }
            let mut targets = HashSet::new();
            for target in &set.targets {
                if !targets.insert(target.name()) {
                    return Err(SdkError::ConfigError(format!(
                        "feature set '{}': target '{}' is defined twice",
                        set.name,
                        target.name()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn feature_set(&self, name: &str) -> Option<&FeatureSetConfig> {
        self.feature_sets.iter().find(|s| s.name == name)
    }

    pub(crate) fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// One feature set definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSetConfig {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Entity name
    pub entity: String,

    /// Entity key column; defaults to the entity name
    #[serde(default)]
    pub entity_column: Option<String>,

    #[serde(default = "default_timestamp_key")]
    pub timestamp_key: String,

    #[serde(default)]
    pub source: Option<SourceConfig>,

    #[serde(default)]
    pub steps: Vec<StepConfig>,

    #[serde(default)]
    pub aggregations: Vec<AggregationSpec>,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

fn default_timestamp_key() -> String {
    "timestamp".to_string()
}

/// Batch source: a delimited text file plus preprocessing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,

    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    #[serde(default = "default_quote")]
    pub quote: char,

    /// Zero-based column to drop, e.g. a row index written by another tool
    #[serde(default)]
    pub index_col: Option<usize>,

    /// Columns parsed as timestamps
    #[serde(default)]
    pub parse_dates: Vec<String>,

    /// Stable sort by this column before `limit`
    #[serde(default)]
    pub sort_by: Option<String>,

    /// Keep at most this many rows
    #[serde(default)]
    pub limit: Option<usize>,

    /// Shift timestamps up to now and keep this trailing window
    #[serde(default)]
    pub align: Option<TimeSpan>,
}

fn default_delimiter() -> char {
    ','
}

fn default_quote() -> char {
    '"'
}

impl SourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: default_delimiter(),
            quote: default_quote(),
            index_col: None,
            parse_dates: Vec::new(),
            sort_by: None,
            limit: None,
            align: None,
        }
    }
}

/// One transform step; `name` defaults to the step kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(flatten)]
    pub kind: StepKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    MapValues(MapValues),
    OneHotEncoder(OneHotEncoder),
    DateExtractor(DateExtractor),
    /// A handler registered on the builder under `handler`
    Custom { handler: String },
}

/// Sink target descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetConfig {
    Parquet {
        #[serde(default = "default_parquet_name")]
        name: String,
        /// Relative paths resolve against the store root
        path: PathBuf,
        #[serde(default)]
        mode: WriteMode,
    },
    Redis {
        #[serde(default = "default_redis_name")]
        name: String,
        /// Falls back to the store settings URL
        #[serde(default)]
        url: Option<String>,
    },
    Memory {
        #[serde(default = "default_memory_name")]
        name: String,
    },
}

fn default_parquet_name() -> String {
    "parquet".to_string()
}

fn default_redis_name() -> String {
    "redis".to_string()
}

fn default_memory_name() -> String {
    "memory".to_string()
}

impl TargetConfig {
    pub fn name(&self) -> &str {
        match self {
            TargetConfig::Parquet { name, .. }
            | TargetConfig::Redis { name, .. }
            | TargetConfig::Memory { name } => name,
        }
    }

    /// Key-value target whose contents outlive the process that wrote them
    pub fn is_persistent_key_value(&self) -> bool {
        matches!(self, TargetConfig::Redis { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fstore_runtime::{AggregationOp, DatePart, UnknownCategoryPolicy};

    const PIPELINE: &str = r#"
feature_sets:
  - name: transactions
    description: transactions feature set
    entity: source
    source:
      path: data/transactions.csv
      parse_dates: [timestamp]
      sort_by: source
      limit: 10000
      align: 2d
    steps:
      - kind: date_extractor
        parts: [hour, day_of_week]
      - kind: map_values
        mapping:
          age: { U: "0" }
        with_original_features: true
      - name: encode
        kind: one_hot_encoder
        mapping:
          category: [es_food, es_tech]
        on_unknown: drop
    aggregations:
      - name: amount
        column: amount
        operations: [avg, sum]
        windows: [2h, 12h]
        period: 1h
    targets:
      - kind: parquet
        path: transactions
      - kind: memory
        name: online
  - name: labels
    entity: source
    steps:
      - kind: custom
        handler: create_labels
"#;

    #[test]
    fn test_pipeline_parses() {
        let config = PipelineConfig::from_yaml_str(PIPELINE).unwrap();
        assert_eq!(config.feature_sets.len(), 2);

        let transactions = config.feature_set("transactions").unwrap();
        assert_eq!(transactions.timestamp_key, "timestamp");
        let source = transactions.source.as_ref().unwrap();
        assert_eq!(source.delimiter, ',');
        assert_eq!(source.limit, Some(10000));
        assert_eq!(source.align.unwrap().as_seconds(), 2 * 86_400);

        match &transactions.steps[0].kind {
            StepKind::DateExtractor(step) => {
                assert_eq!(step.parts, vec![DatePart::Hour, DatePart::DayOfWeek]);
                assert_eq!(step.timestamp_col, "timestamp");
            }
            other => panic!("unexpected step: {other:?}"),
        }
        assert_eq!(transactions.steps[2].name.as_deref(), Some("encode"));
        match &transactions.steps[2].kind {
            StepKind::OneHotEncoder(step) => {
                assert_eq!(step.on_unknown, UnknownCategoryPolicy::Drop)
            }
            other => panic!("unexpected step: {other:?}"),
        }

        let agg = &transactions.aggregations[0];
        assert_eq!(agg.operations, vec![AggregationOp::Avg, AggregationOp::Sum]);
        assert_eq!(agg.period.as_seconds(), 3600);

        assert_eq!(transactions.targets[0].name(), "parquet");
        assert_eq!(transactions.targets[1].name(), "online");

        let labels = config.feature_set("labels").unwrap();
        assert!(matches!(
            labels.steps[0].kind,
            StepKind::Custom { ref handler } if handler == "create_labels"
        ));
    }

    #[test]
    fn test_unknown_duration_unit_is_rejected() {
        let yaml = r#"
feature_sets:
  - name: t
    entity: source
    aggregations:
      - name: amount
        column: amount
        operations: [sum]
        windows: [2x]
        period: 1h
"#;
        assert!(matches!(
            PipelineConfig::from_yaml_str(yaml),
            Err(SdkError::YamlError(_))
        ));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let yaml = r#"
feature_sets:
  - name: t
    entity: source
  - name: t
    entity: source
"#;
        assert!(matches!(
            PipelineConfig::from_yaml_str(yaml),
            Err(SdkError::ConfigError(_))
        ));

        let yaml = r#"
feature_sets:
  - name: t
    entity: source
    targets:
      - kind: memory
      - kind: memory
"#;
        assert!(matches!(
            PipelineConfig::from_yaml_str(yaml),
            Err(SdkError::ConfigError(_))
        ));
    }

    #[test]
    fn test_relative_sources_resolve_against_base_dir() {
        let mut config = PipelineConfig::from_yaml_str(PIPELINE).unwrap();
        config.base_dir = Some(PathBuf::from("/pipelines"));
        assert_eq!(
            config.resolve(Path::new("data/t.csv")),
            PathBuf::from("/pipelines/data/t.csv")
        );
        assert_eq!(config.resolve(Path::new("/abs.csv")), PathBuf::from("/abs.csv"));
    }
}
