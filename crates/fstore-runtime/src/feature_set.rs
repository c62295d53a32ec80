//! Feature set definition
//!
//! A feature set binds an entity key, a timestamp column, a transform graph
//! and aggregation specs under one name and a versioned schema.

use crate::aggregation::{AggregationEngine, AggregationSpec};
use crate::error::{Result, RuntimeError};
use crate::transform::TransformGraph;
use fstore_core::{Batch, FeatureRecord, Schema, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Subject a feature record describes, identified by one key column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,

    /// Column holding the key; defaults to the entity name
    pub key_column: String,
}

impl Entity {
    /// Entity whose key column has the same name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key_column: name.clone(),
            name,
        }
    }

    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = column.into();
        self
    }
}

/// Named, versioned feature domain
/// Schema a run would leave behind, held until the run completes
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SchemaUpdate {
    pub schema: Schema,
    pub version: u32,
    /// Columns the batch brought in
    pub added: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FeatureSet {
    name: String,
    description: Option<String>,
    entity: Entity,
    timestamp_key: String,
    graph: TransformGraph,
    aggregations: AggregationEngine,
    schema: Option<Schema>,
    version: u32,
}

impl FeatureSet {
    pub fn new(name: impl Into<String>, entity: Entity, timestamp_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            entity,
            timestamp_key: timestamp_key.into(),
            graph: TransformGraph::new(),
            aggregations: AggregationEngine::default(),
            schema: None,
            version: 1,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_graph(mut self, graph: TransformGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Declare the input schema instead of inferring it from the first batch
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Add an aggregation, validating it against the ones already present
    pub fn add_aggregation(&mut self, spec: AggregationSpec) -> Result<()> {
        let mut specs = self.aggregations.specs().to_vec();
        specs.push(spec);
        self.aggregations = AggregationEngine::new(specs).map_err(|e| match e {
            RuntimeError::AggregationConfig(message) => RuntimeError::AggregationConfig(format!(
                "feature set '{}': {}",
                self.name, message
            )),
            other => other,
        })?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn timestamp_key(&self) -> &str {
        &self.timestamp_key
    }

    pub fn graph(&self) -> &TransformGraph {
        &self.graph
    }

    pub fn aggregations(&self) -> &AggregationEngine {
        &self.aggregations
    }

    /// Input schema, once declared or inferred
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Validate the graph configuration
    pub fn validate(&self) -> Result<()> {
        self.graph.validate()
    }

    /// Check a raw batch against the schema, inferring it on first use and
    /// widening it when the batch brings new columns.
    ///
    /// Nothing is changed here: the returned update, if any, is applied with
    /// [`FeatureSet::commit_schema`] once the run has completed.
    pub(crate) fn reconcile_schema(&self, batch: &Batch) -> Result<Option<SchemaUpdate>> {
        if batch.is_empty() {
            return Ok(None);
        }

        let key = &self.entity.key_column;
        for required in [key, &self.timestamp_key] {
            if !batch.has_column(required) {
                return Err(RuntimeError::Schema(format!(
                    "feature set '{}' needs column '{}'",
                    self.name, required
                )));
            }
        }

        for (row, record) in batch.iter().enumerate() {
            if record.get(key).map_or(true, Value::is_null) {
                return Err(RuntimeError::Schema(format!(
                    "row {} has a null entity key '{}'",
                    row, key
                )));
            }
            if record
                .get(&self.timestamp_key)
                .and_then(Value::to_timestamp)
                .is_none()
            {
                return Err(RuntimeError::Schema(format!(
                    "row {} has no parseable timestamp in column '{}'",
                    row, self.timestamp_key
                )));
            }
        }

        let schema_error = |e: fstore_core::CoreError| RuntimeError::Schema(e.to_string());

        match &self.schema {
            None => {
                let schema = Schema::infer(self.name.clone(), batch).map_err(schema_error)?;
                let added = schema.fields.keys().cloned().collect();
                Ok(Some(SchemaUpdate {
                    schema,
                    version: self.version,
                    added,
                }))
            }
            Some(current) => {
                let added = current.check(batch).map_err(schema_error)?;
                let mut schema = current.clone();
                if schema.evolve(batch).map_err(schema_error)? {
                    Ok(Some(SchemaUpdate {
                        schema,
                        version: self.version + 1,
                        added,
                    }))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Apply an update produced by [`FeatureSet::reconcile_schema`]
    pub(crate) fn commit_schema(&mut self, update: SchemaUpdate) {
        let inferred = self.schema.is_none();
        self.schema = Some(update.schema);
        self.version = update.version;
        if inferred {
            info!(
                feature_set = %self.name,
                columns = update.added.len(),
                "inferred schema"
            );
        } else {
            info!(
                feature_set = %self.name,
                version = self.version,
                added = ?update.added,
                "schema evolved"
            );
        }
    }

    /// Split enriched records into feature records.
    ///
    /// Every record gets the full column set of the batch so downstream
    /// sinks see a rectangular table.
    pub(crate) fn feature_records(&self, batch: &Batch) -> Result<Vec<FeatureRecord>> {
        let key = &self.entity.key_column;
        let columns: Vec<String> = batch
            .columns()
            .into_iter()
            .filter(|c| c != key && c != &self.timestamp_key)
            .collect();

        batch
            .iter()
            .enumerate()
            .map(|(row, record)| {
                let entity_key = record.get(key).and_then(Value::as_key).ok_or_else(|| {
                    RuntimeError::Schema(format!(
                        "transformed row {} lost entity key '{}'",
                        row, key
                    ))
                })?;
                let timestamp = record
                    .get(&self.timestamp_key)
                    .and_then(Value::to_timestamp)
                    .ok_or_else(|| {
                        RuntimeError::Schema(format!(
                            "transformed row {} lost timestamp '{}'",
                            row, self.timestamp_key
                        ))
                    })?;
                let features: IndexMap<String, Value> = columns
                    .iter()
                    .map(|c| (c.clone(), record.get(c).cloned().unwrap_or(Value::Null)))
                    .collect();
                Ok(FeatureRecord {
                    entity_key,
                    timestamp,
                    features,
                })
            })
            .collect()
    }
}
