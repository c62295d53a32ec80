//! Windowed aggregation engine
//!
//! For every record of key K at time T, each configured aggregate reflects
//! the same-key records in `(T - window, T]` that were processed at or before
//! it. Records are stably sorted by timestamp first, so equal timestamps keep
//! their input order.

use crate::aggregation::spec::{output_column, AggregationOp, AggregationSpec};
use crate::aggregation::window::{Partial, RollingWindow, Sample};
use crate::error::{Result, RuntimeError};
use fstore_core::{Batch, Value};
use std::collections::HashMap;
use tracing::debug;

/// Computes aggregate feature columns for a batch
///
/// Rolling state lives only for the duration of one [`AggregationEngine::run`].
#[derive(Debug, Clone, Default)]
pub struct AggregationEngine {
    specs: Vec<AggregationSpec>,
}

struct SpecState<'a> {
    spec: &'a AggregationSpec,
    columns: Vec<Vec<String>>,
    windows: HashMap<String, Vec<RollingWindow>>,
}

impl<'a> SpecState<'a> {
    fn new(spec: &'a AggregationSpec) -> Self {
        let columns = spec
            .operations
            .iter()
            .map(|op| {
                spec.windows
                    .iter()
                    .map(|w| output_column(&spec.name, *op, w))
                    .collect()
            })
            .collect();
        Self {
            spec,
            columns,
            windows: HashMap::new(),
        }
    }

    fn sample(&self, ts: i64, value: &Value) -> Result<Sample> {
        match value {
            Value::Null => Ok(Sample {
                ts,
                value: None,
                present: false,
            }),
            other => match other.as_f64() {
                Some(n) => Ok(Sample {
                    ts,
                    value: Some(n),
                    present: true,
                }),
                None if !self.spec.needs_numeric() => Ok(Sample {
                    ts,
                    value: None,
                    present: true,
                }),
                None => Err(RuntimeError::InvalidValue(format!(
                    "aggregation '{}' needs numeric values in column '{}', got {} '{}'",
                    self.spec.name,
                    self.spec.column,
                    other.type_name(),
                    other
                ))),
            },
        }
    }

    fn advance(&mut self, key: &str, sample: Sample) -> Vec<Partial> {
        let spec = self.spec;
        let windows = self.windows.entry(key.to_string()).or_insert_with(|| {
            spec.windows
                .iter()
                .map(|w| RollingWindow::new(w.as_micros(), spec.period.as_micros()))
                .collect()
        });

        windows
            .iter_mut()
            .map(|window| {
                window.evict(sample.ts);
                window.push(sample);
                window.snapshot()
            })
            .collect()
    }
}

fn reduce(op: AggregationOp, partial: &Partial) -> Value {
    match op {
        AggregationOp::Sum => Value::Number(partial.sum),
        AggregationOp::Count => Value::Number(partial.count as f64),
        AggregationOp::Avg => partial.avg().map(Value::Number).unwrap_or(Value::Null),
        AggregationOp::Max => partial.max.map(Value::Number).unwrap_or(Value::Null),
        AggregationOp::Min => partial.min.map(Value::Number).unwrap_or(Value::Null),
    }
}

impl AggregationEngine {
    /// Create an engine, validating every spec and rejecting duplicate
    /// output columns
    pub fn new(specs: Vec<AggregationSpec>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for spec in &specs {
            spec.validate()?;
            for column in spec.output_columns() {
                if !seen.insert(column.clone()) {
                    return Err(RuntimeError::AggregationConfig(format!(
                        "output column '{}' is produced twice",
                        column
                    )));
                }
            }
        }
        Ok(Self { specs })
    }

    pub fn specs(&self) -> &[AggregationSpec] {
        &self.specs
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Every output column, in the order they are appended to records
    pub fn output_columns(&self) -> Vec<String> {
        self.specs
            .iter()
            .flat_map(AggregationSpec::output_columns)
            .collect()
    }

    /// Sort the batch by timestamp and append every aggregate column.
    ///
    /// Timestamps are coerced through [`Value::to_timestamp`]; a record
    /// without one, or without an entity key, is rejected.
    pub fn run(&self, batch: Batch, entity_column: &str, timestamp_column: &str) -> Result<Batch> {
        if batch.is_empty() {
            return Ok(batch);
        }

        for spec in &self.specs {
            if !batch.has_column(&spec.column) {
                return Err(RuntimeError::Schema(format!(
                    "aggregation '{}' source column '{}' is not in the batch",
                    spec.name, spec.column
                )));
            }
        }

        let mut keyed = Vec::with_capacity(batch.len());
        for (row, record) in batch.into_iter().enumerate() {
            let ts = record
                .get(timestamp_column)
                .and_then(Value::to_timestamp)
                .ok_or_else(|| {
                    RuntimeError::Schema(format!(
                        "row {} has no parseable timestamp in column '{}'",
                        row, timestamp_column
                    ))
                })?
                .timestamp_micros();
            let key = record
                .get(entity_column)
                .and_then(Value::as_key)
                .ok_or_else(|| {
                    RuntimeError::Schema(format!(
                        "row {} has a null entity key in column '{}'",
                        row, entity_column
                    ))
                })?;
            keyed.push((ts, key, record));
        }

        // stable: equal timestamps keep input order
        keyed.sort_by_key(|(ts, _, _)| *ts);

        let mut states: Vec<SpecState<'_>> = self.specs.iter().map(SpecState::new).collect();
        let mut out = Vec::with_capacity(keyed.len());

        for (ts, key, mut record) in keyed {
            for state in states.iter_mut() {
                let raw = record.get(&state.spec.column).unwrap_or(&Value::Null);
                let sample = state.sample(ts, raw)?;
                let partials = state.advance(&key, sample);

                for (op, columns) in state.spec.operations.iter().zip(&state.columns) {
                    for (partial, column) in partials.iter().zip(columns) {
                        record.insert(column.clone(), reduce(*op, partial));
                    }
                }
            }
            out.push(record);
        }

        debug!(
            rows = out.len(),
            specs = self.specs.len(),
            keys = states.first().map(|s| s.windows.len()).unwrap_or(0),
            "aggregation complete"
        );

        Ok(Batch::new(out))
    }
}
