//! Runtime error types

use crate::ingest::IngestStage;
use fstore_core::CoreError;
use thiserror::Error;

/// Runtime error
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Batch does not match the feature set schema
    #[error("Schema error: {0}")]
    Schema(String),

    /// A step referenced a column the incoming batch does not carry
    #[error("Step '{step}' references missing column '{column}'")]
    MissingColumn { step: String, column: String },

    /// A transform step failed
    #[error("Step '{step}' failed: {message}")]
    Transform { step: String, message: String },

    /// Categorical value outside the vocabulary under the `error` policy
    #[error("Value '{value}' of column '{column}' is outside the vocabulary")]
    VocabularyMiss { column: String, value: String },

    /// Malformed aggregation window/period specification
    #[error("Aggregation config error: {0}")]
    AggregationConfig(String),

    /// Invalid step or feature set configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Invalid value
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A sink rejected a write or could not be reached
    #[error("Sink '{sink}' write failed: {message}")]
    SinkWrite { sink: String, message: String },

    /// A sink did not finish within the caller-supplied timeout
    #[error("Sink '{sink}' timed out after {timeout_ms}ms")]
    SinkTimeout { sink: String, timeout_ms: u64 },

    /// A fatal error stopped an ingestion run
    #[error("Ingestion of '{feature_set}' failed while {stage}: {source}")]
    IngestionFailed {
        feature_set: String,
        stage: IngestStage,
        #[source]
        source: Box<RuntimeError>,
    },

    /// Core type error
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RuntimeError {
    pub(crate) fn sink_write(sink: &str, message: impl Into<String>) -> Self {
        RuntimeError::SinkWrite {
            sink: sink.to_string(),
            message: message.into(),
        }
    }

    /// Stage at which an ingestion run stopped, if this error ended one
    pub fn failed_stage(&self) -> Option<IngestStage> {
        match self {
            RuntimeError::IngestionFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
