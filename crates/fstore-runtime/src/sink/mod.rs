//! Feature record sinks
//!
//! Durable destinations for the feature records of an ingestion run:
//! - [`ParquetSink`]: append-only partitioned columnar files
//! - [`KeyValueSink`]: latest record per entity key for point lookups

mod columnar;
mod kv;

pub use kv::{KeyValueSink, KeyValueStore, MemoryStore};
#[cfg(feature = "redis")]
pub use kv::RedisStore;
pub use columnar::{ParquetSink, WriteMode};

use crate::error::Result;
use fstore_core::FeatureRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sink variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Columnar,
    KeyValue,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::Columnar => write!(f, "columnar"),
            SinkKind::KeyValue => write!(f, "key_value"),
        }
    }
}

/// What a sink needs to know about the run it is writing for
#[derive(Debug, Clone)]
pub struct SinkContext {
    pub feature_set: String,
    pub schema_version: u32,
    pub run_id: Uuid,
    pub entity_column: String,
    pub timestamp_column: String,
}

/// Destination for feature records
///
/// Records arrive in coordinator order and must be written in that order.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    /// Unique name within a run, used in reports
    fn name(&self) -> &str;

    fn kind(&self) -> SinkKind;

    /// Persist the records, returning how many rows were written
    async fn write(&self, ctx: &SinkContext, records: &[FeatureRecord]) -> Result<usize>;
}
