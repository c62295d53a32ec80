//! One-hot categorical encoding step

use crate::error::{Result, RuntimeError};
use crate::transform::{require_columns, VocabularyMisses};
use fstore_core::{Batch, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// What to do with a value outside the configured vocabulary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownCategoryPolicy {
    /// Emit all-zero indicators
    #[default]
    Zero,
    /// Drop the record from the batch
    Drop,
    /// Fail the transform
    Error,
}

/// Expands categorical columns into one indicator column per vocabulary entry
///
/// The source column is replaced in place by `<column>_<entry>` columns
/// holding 1 or 0. Vocabularies are fixed at configuration time; misses are
/// counted and logged whatever the policy. Null values encode as all zeros
/// and are not counted as misses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    /// column -> vocabulary
    pub mapping: IndexMap<String, Vec<String>>,

    #[serde(default)]
    pub on_unknown: UnknownCategoryPolicy,
}

impl OneHotEncoder {
    /// Encoder for a single column
    pub fn new<S: Into<String>>(
        column: impl Into<String>,
        vocabulary: impl IntoIterator<Item = S>,
    ) -> Self {
        let mut mapping = IndexMap::new();
        mapping.insert(
            column.into(),
            vocabulary.into_iter().map(Into::into).collect(),
        );
        Self {
            mapping,
            on_unknown: UnknownCategoryPolicy::Zero,
        }
    }

    /// Add another column to encode in the same step
    pub fn with_column<S: Into<String>>(
        mut self,
        column: impl Into<String>,
        vocabulary: impl IntoIterator<Item = S>,
    ) -> Self {
        self.mapping.insert(
            column.into(),
            vocabulary.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn on_unknown(mut self, policy: UnknownCategoryPolicy) -> Self {
        self.on_unknown = policy;
        self
    }

    /// Indicator column names for one encoded column, in vocabulary order
    pub fn indicator_columns(&self, column: &str) -> Vec<String> {
        self.mapping
            .get(column)
            .map(|vocab| {
                vocab
                    .iter()
                    .map(|entry| format!("{}_{}", column, entry))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.mapping.is_empty() {
            return Err(RuntimeError::InvalidConfig(
                "one_hot_encoder needs at least one column".to_string(),
            ));
        }
        for (column, vocab) in &self.mapping {
            if vocab.is_empty() {
                return Err(RuntimeError::InvalidConfig(format!(
                    "one_hot_encoder vocabulary for '{}' is empty",
                    column
                )));
            }
            let mut seen = HashSet::new();
            for entry in vocab {
                if entry.is_empty() {
                    return Err(RuntimeError::InvalidConfig(format!(
                        "one_hot_encoder vocabulary for '{}' has an empty entry",
                        column
                    )));
                }
                if !seen.insert(entry.as_str()) {
                    return Err(RuntimeError::InvalidConfig(format!(
                        "one_hot_encoder vocabulary for '{}' repeats '{}'",
                        column, entry
                    )));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn apply(
        &self,
        step: &str,
        batch: Batch,
        misses: &mut VocabularyMisses,
    ) -> Result<Batch> {
        require_columns(step, &batch, self.mapping.keys())?;

        let mut encoded = Vec::with_capacity(batch.len());
        'records: for mut record in batch {
            for (column, vocab) in &self.mapping {
                let index = record.get_index_of(column).unwrap_or(record.len());
                let value = record.shift_remove(column).unwrap_or(Value::Null);
                let key = value.as_key();

                let hit = key
                    .as_ref()
                    .and_then(|k| vocab.iter().position(|entry| entry == k));

                if let (Some(raw), None) = (&key, hit) {
                    *misses.entry(column.clone()).or_insert(0) += 1;
                    warn!(
                        step,
                        column = %column,
                        value = %raw,
                        policy = ?self.on_unknown,
                        "vocabulary miss"
                    );
                    match self.on_unknown {
                        UnknownCategoryPolicy::Zero => {}
                        UnknownCategoryPolicy::Drop => continue 'records,
                        UnknownCategoryPolicy::Error => {
                            return Err(RuntimeError::VocabularyMiss {
                                column: column.clone(),
                                value: raw.clone(),
                            });
                        }
                    }
                }

                for (offset, entry) in vocab.iter().enumerate() {
                    let indicator = if hit == Some(offset) { 1.0 } else { 0.0 };
                    record.shift_insert(
                        index + offset,
                        format!("{}_{}", column, entry),
                        Value::Number(indicator),
                    );
                }
            }
            encoded.push(record);
        }

        Ok(Batch::new(encoded))
    }
}
