//! fstore Runtime - Feature engineering pipeline execution
//!
//! This crate turns raw timestamped records into feature records and
//! persists them:
//! - Temporal alignment of historical datasets
//! - Transform graphs (value mapping, one-hot encoding, date parts, custom handlers)
//! - Trailing-window aggregation per entity key
//! - Feature set definitions with versioned schemas
//! - Concurrent multi-sink ingestion with per-sink outcomes

pub mod aggregation;
pub mod align;
pub mod error;
pub mod feature_set;
pub mod ingest;
pub mod sink;
pub mod transform;

// Re-export main types
pub use aggregation::{AggregationEngine, AggregationOp, AggregationSpec};
pub use align::TemporalAligner;
pub use error::{Result, RuntimeError};
pub use feature_set::{Entity, FeatureSet};
pub use ingest::{IngestReport, IngestStage, IngestionCoordinator, RunStatus, SinkOutcome};
#[cfg(feature = "redis")]
pub use sink::RedisStore;
pub use sink::{
    KeyValueSink, KeyValueStore, MemoryStore, ParquetSink, Sink, SinkContext, SinkKind, WriteMode,
};
pub use transform::{
    BatchHandler, CustomHandler, DateExtractor, DatePart, HandlerRegistry, MapValues,
    OneHotEncoder, TransformGraph, TransformOutput, TransformStep, UnknownCategoryPolicy,
    VocabularyMisses,
};
