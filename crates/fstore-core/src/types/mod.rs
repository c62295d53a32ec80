//! Type system for feature pipeline data

pub mod record;
pub mod schema;
pub mod span;
pub mod value;

pub use record::{Batch, FeatureRecord, Record};
pub use schema::{FieldType, Schema, SchemaField};
pub use span::{TimeSpan, TimeUnit, MAX_SPAN_SECONDS};
pub use value::Value;
