//! Windowed aggregation
//!
//! Trailing-window reducers computed per entity key over a timestamp-sorted
//! batch.

mod engine;
mod spec;
mod window;

pub use engine::AggregationEngine;
pub use spec::{AggregationOp, AggregationSpec};
