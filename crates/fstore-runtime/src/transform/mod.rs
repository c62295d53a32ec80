//! Transform graph
//!
//! A linear chain of steps. Each step consumes the full output batch of the
//! previous one; a failing step aborts the whole run and no partially
//! transformed batch escapes.

mod date;
mod encoder;
mod handler;
mod mapper;
mod step;

pub use date::{DateExtractor, DatePart};
pub use encoder::{OneHotEncoder, UnknownCategoryPolicy};
pub use handler::{BatchHandler, CustomHandler, HandlerRegistry};
pub use mapper::MapValues;
pub use step::TransformStep;

use crate::error::{Result, RuntimeError};
use fstore_core::Batch;
use std::collections::BTreeMap;
use tracing::debug;

/// Out-of-vocabulary hits per encoded column
pub type VocabularyMisses = BTreeMap<String, u64>;

/// Fail with `MissingColumn` unless every column is present.
///
/// An empty batch has no columns and passes.
pub(crate) fn require_columns<'a>(
    step: &str,
    batch: &Batch,
    columns: impl IntoIterator<Item = &'a String>,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    for column in columns {
        if !batch.has_column(column) {
            return Err(RuntimeError::MissingColumn {
                step: step.to_string(),
                column: column.clone(),
            });
        }
    }
    Ok(())
}

/// A named step inside a graph
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub name: String,
    pub step: TransformStep,
}

/// Result of running a graph over a batch
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub batch: Batch,
    pub vocabulary_misses: VocabularyMisses,
}

/// Ordered chain of transform steps
#[derive(Debug, Clone, Default)]
pub struct TransformGraph {
    nodes: Vec<GraphNode>,
}

impl TransformGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step named after its kind
    pub fn to(self, step: impl Into<TransformStep>) -> Self {
        let step = step.into();
        let name = step.kind().to_string();
        self.to_named(name, step)
    }

    /// Append a step under an explicit name.
    ///
    /// Names are made unique by suffixing `_2`, `_3`, ... so errors always
    /// point at one node.
    pub fn to_named(mut self, name: impl Into<String>, step: impl Into<TransformStep>) -> Self {
        let base = name.into();
        let mut name = base.clone();
        let mut n = 1;
        while self.nodes.iter().any(|node| node.name == name) {
            n += 1;
            name = format!("{}_{}", base, n);
        }
        self.nodes.push(GraphNode {
            name,
            step: step.into(),
        });
        self
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validate every step's configuration
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            node.step.validate().map_err(|e| match e {
                RuntimeError::InvalidConfig(message) => {
                    RuntimeError::InvalidConfig(format!("step '{}': {}", node.name, message))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Run every step in order over the batch
    pub fn run(&self, batch: Batch) -> Result<TransformOutput> {
        let mut misses = VocabularyMisses::new();
        let mut current = batch;

        for node in &self.nodes {
            let before = current.len();
            current = node.step.apply(&node.name, current, &mut misses)?;
            debug!(
                step = %node.name,
                rows_in = before,
                rows_out = current.len(),
                "transform step applied"
            );
        }

        Ok(TransformOutput {
            batch: current,
            vocabulary_misses: misses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fstore_core::{Record, Value};

    fn batch(categories: &[&str]) -> Batch {
        categories
            .iter()
            .map(|c| {
                let mut r = Record::new();
                r.insert("category".to_string(), Value::from(*c));
                r
            })
            .collect()
    }

    #[test]
    fn test_steps_run_in_order() {
        let graph = TransformGraph::new()
            .to(MapValues::new("category", [("a", "b")]))
            .to(MapValues::new("category", [("b", "c")]));
        let swapped = TransformGraph::new()
            .to(MapValues::new("category", [("b", "c")]))
            .to(MapValues::new("category", [("a", "b")]));

        let out = graph.run(batch(&["a"])).unwrap().batch;
        let out_swapped = swapped.run(batch(&["a"])).unwrap().batch;

        assert_eq!(out.records()[0]["category"], Value::from("c"));
        assert_eq!(out_swapped.records()[0]["category"], Value::from("b"));
    }

    #[test]
    fn test_duplicate_names_are_suffixed() {
        let graph = TransformGraph::new()
            .to(MapValues::new("category", [("a", "b")]))
            .to(MapValues::new("category", [("b", "c")]));

        let names: Vec<&str> = graph.nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["map_values", "map_values_2"]);
    }

    #[test]
    fn test_failure_names_the_step() {
        let graph = TransformGraph::new()
            .to(OneHotEncoder::new("category", ["a", "b"]))
            .to(MapValues::new("category", [("a", "b")]));

        let err = graph.run(batch(&["a"])).unwrap_err();
        match err {
            RuntimeError::MissingColumn { step, column } => {
                assert_eq!(step, "map_values");
                assert_eq!(column, "category");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_custom_handler_errors_become_transform_errors() {
        let graph = TransformGraph::new().to(CustomHandler::new(
            "reject_all",
            |_: Batch| -> Result<Batch> { Err(RuntimeError::InvalidValue("nope".to_string())) },
        ));

        let err = graph.run(batch(&["a"])).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Transform { ref step, .. } if step == "reject_all"
        ));
    }

    #[test]
    fn test_empty_graph_passes_batch_through() {
        let out = TransformGraph::new().run(batch(&["a", "b"])).unwrap();
        assert_eq!(out.batch.len(), 2);
        assert!(out.vocabulary_misses.is_empty());
    }
}
