//! Records, batches and feature records

use crate::types::value::Value;
use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// One row: column name to value, in column order
pub type Record = IndexMap<String, Value>;

/// An ordered batch of records flowing through one ingestion run
///
/// Records of a batch are expected to share a column set. A column counts as
/// present when any record carries it; records lacking it read as `Null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Union of column names in first-seen order
    pub fn columns(&self) -> Vec<String> {
        let mut seen = IndexSet::new();
        for record in &self.records {
            for name in record.keys() {
                if !seen.contains(name.as_str()) {
                    seen.insert(name.clone());
                }
            }
        }
        seen.into_iter().collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.contains_key(name))
    }

    /// Keep only the first `n` records
    pub fn truncate(&mut self, n: usize) {
        self.records.truncate(n);
    }

    /// Stable sort by the key rendering of a column; nulls sort first.
    ///
    /// Numbers compare numerically and timestamps chronologically.
    pub fn sort_by_column(&mut self, name: &str) {
        self.records.sort_by(|a, b| {
            let left = a.get(name).unwrap_or(&Value::Null);
            let right = b.get(name).unwrap_or(&Value::Null);
            compare_values(left, right)
        });
    }
}

fn compare_values(left: &Value, right: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
        _ => left.as_key().cmp(&right.as_key()),
    }
}

impl From<Vec<Record>> for Batch {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

impl FromIterator<Record> for Batch {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Batch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Terminal output of an ingestion run for one input record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Entity key rendered as a string
    pub entity_key: String,

    /// Row timestamp taken from the feature set's timestamp column
    pub timestamp: DateTime<Utc>,

    /// Passthrough, transformed and aggregated columns, excluding the entity
    /// and timestamp columns
    pub features: IndexMap<String, Value>,
}

impl FeatureRecord {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.features.get(name)
    }

    /// Numeric view of a feature, `None` when absent or non-numeric
    pub fn number(&self, name: &str) -> Option<f64> {
        self.features.get(name).and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_batch_columns_union_in_order() {
        let batch = Batch::new(vec![
            record(&[("source", "C1".into()), ("amount", 10.0.into())]),
            record(&[("source", "C2".into()), ("category", "es_food".into())]),
        ]);

        assert_eq!(batch.columns(), vec!["source", "amount", "category"]);
        assert!(batch.has_column("category"));
        assert!(!batch.has_column("gender"));
    }

    #[test]
    fn test_sort_by_column_is_stable() {
        let mut batch = Batch::new(vec![
            record(&[("source", "B".into()), ("n", 1.into())]),
            record(&[("source", "A".into()), ("n", 2.into())]),
            record(&[("source", "B".into()), ("n", 3.into())]),
            record(&[("n", 4.into())]),
        ]);

        batch.sort_by_column("source");
        let order: Vec<f64> = batch
            .iter()
            .map(|r| r["n"].as_f64().unwrap())
            .collect();
        assert_eq!(order, vec![4.0, 2.0, 1.0, 3.0]);
    }
}
