//! fstore Core - Core types for the fstore feature pipeline
//!
//! This crate provides the fundamental types used across the fstore crates:
//! - Scalar values, records and batches
//! - Feature records produced by an ingestion run
//! - Schemas inferred from or declared for a feature set
//! - Duration parsing for windows and periods
//! - Error types

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use types::{
    Batch, FeatureRecord, FieldType, Record, Schema, SchemaField, TimeSpan, TimeUnit, Value,
    MAX_SPAN_SECONDS,
};
