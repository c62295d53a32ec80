//! fstore SDK
//!
//! High-level API for defining feature pipelines in YAML, loading batch
//! sources and running ingestion into the configured targets.

pub mod builder;
pub mod config;
pub mod error;
pub mod handlers;
pub mod source;
pub mod store;

// Re-export main types
pub use builder::{feature_set_from_config, FeatureStoreBuilder};
pub use config::{
    FeatureSetConfig, PipelineConfig, SourceConfig, StepConfig, StepKind, StoreSettings,
    TargetConfig,
};
pub use error::{Result, SdkError};
pub use handlers::{builtin_handlers, create_labels};
pub use store::FeatureStore;

// Re-export commonly used types from dependencies
pub use fstore_core::{Batch, FeatureRecord, Record, Schema, TimeSpan, Value};
pub use fstore_runtime::Result as RuntimeResult;
pub use fstore_runtime::{
    AggregationOp, AggregationSpec, Entity, FeatureSet, HandlerRegistry, IngestReport,
    IngestStage, MemoryStore, RunStatus, RuntimeError, SinkOutcome, WriteMode,
};
