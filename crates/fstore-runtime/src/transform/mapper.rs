//! Value substitution step

use crate::error::{Result, RuntimeError};
use crate::transform::require_columns;
use fstore_core::{Batch, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

fn default_suffix() -> String {
    "mapped".to_string()
}

/// Replaces column values through explicit substitution tables
///
/// Values without an entry pass through unchanged. With
/// `with_original_features`, the source column is kept and the mapped values
/// go to `<column>_<suffix>` right after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapValues {
    /// column -> (source value key -> replacement)
    pub mapping: IndexMap<String, IndexMap<String, Value>>,

    #[serde(default)]
    pub with_original_features: bool,

    #[serde(default = "default_suffix")]
    pub suffix: String,
}

impl MapValues {
    /// Substitution table for a single column
    pub fn new<K, V>(column: impl Into<String>, table: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let table = table
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mut mapping = IndexMap::new();
        mapping.insert(column.into(), table);

        Self {
            mapping,
            with_original_features: false,
            suffix: default_suffix(),
        }
    }

    pub fn with_original_features(mut self, keep: bool) -> Self {
        self.with_original_features = keep;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.mapping.is_empty() {
            return Err(RuntimeError::InvalidConfig(
                "map_values needs at least one column mapping".to_string(),
            ));
        }
        if self.with_original_features && self.suffix.is_empty() {
            return Err(RuntimeError::InvalidConfig(
                "map_values suffix cannot be empty when originals are kept".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn apply(&self, step: &str, mut batch: Batch) -> Result<Batch> {
        require_columns(step, &batch, self.mapping.keys())?;

        for record in batch.records_mut() {
            for (column, table) in &self.mapping {
                let original = record.get(column).cloned();
                let mapped = original
                    .as_ref()
                    .and_then(Value::as_key)
                    .and_then(|key| table.get(&key).cloned())
                    .or_else(|| original.clone())
                    .unwrap_or(Value::Null);

                if !self.with_original_features {
                    if original.is_some() {
                        record.insert(column.clone(), mapped);
                    }
                    continue;
                }

                let target = format!("{}_{}", column, self.suffix);
                match record.get_index_of(column) {
                    Some(index) if !record.contains_key(&target) => {
                        record.shift_insert(index + 1, target, mapped);
                    }
                    _ => {
                        record.insert(target, mapped);
                    }
                }
            }
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fstore_core::Record;

    fn ages(values: &[&str]) -> Batch {
        values
            .iter()
            .map(|v| {
                let mut r = Record::new();
                r.insert("age".to_string(), Value::from(*v));
                r.insert("amount".to_string(), Value::Number(1.0));
                r
            })
            .collect()
    }

    #[test]
    fn test_replaces_in_place() {
        let step = MapValues::new("age", [("U", "0")]);
        let out = step.apply("map_values", ages(&["U", "3"])).unwrap();

        assert_eq!(out.records()[0]["age"], Value::from("0"));
        assert_eq!(out.records()[1]["age"], Value::from("3"));
        assert_eq!(out.columns(), vec!["age", "amount"]);
    }

    #[test]
    fn test_keeps_original_alongside_mapped() {
        let step = MapValues::new("age", [("U", "0")]).with_original_features(true);
        let out = step.apply("map_values", ages(&["U", "2"])).unwrap();

        assert_eq!(out.columns(), vec!["age", "age_mapped", "amount"]);
        assert_eq!(out.records()[0]["age"], Value::from("U"));
        assert_eq!(out.records()[0]["age_mapped"], Value::from("0"));
        assert_eq!(out.records()[1]["age_mapped"], Value::from("2"));
    }

    #[test]
    fn test_missing_column_fails() {
        let step = MapValues::new("gender", [("F", "female")]);
        let err = step.apply("map_values", ages(&["U"])).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::MissingColumn { ref column, .. } if column == "gender"
        ));
    }
}
