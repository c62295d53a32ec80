//! Schema definitions for feature set input validation
//!
//! A schema is either declared up front or inferred from the first batch
//! ingested into a feature set, and later batches are checked against it.

use crate::error::{CoreError, Result};
use crate::types::record::Batch;
use crate::types::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A schema defines the columns and types of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name (the feature set name)
    pub name: String,

    /// Fields in column order
    pub fields: IndexMap<String, SchemaField>,
}

/// A field in a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Field name
    pub name: String,

    /// Field type
    pub field_type: FieldType,

    /// Whether every record must carry a non-null value
    #[serde(default)]
    pub required: bool,
}

/// Field type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Boolean,
    Number,
    String,
    Timestamp,
    /// No non-null value seen yet; accepts anything
    Any,
}

impl FieldType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => FieldType::Any,
            Value::Bool(_) => FieldType::Boolean,
            Value::Number(_) => FieldType::Number,
            Value::Timestamp(_) => FieldType::Timestamp,
            Value::String(_) => FieldType::String,
        }
    }

    /// Whether a value can be stored in a column of this type
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (FieldType::Any, _) => true,
            _ => *self == FieldType::of(value),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::Boolean => "boolean",
            FieldType::Number => "number",
            FieldType::String => "string",
            FieldType::Timestamp => "timestamp",
            FieldType::Any => "any",
        };
        write!(f, "{}", name)
    }
}

impl Schema {
    /// Create a new empty schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Add a field
    pub fn add_field(mut self, field: SchemaField) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Get a field by name
    pub fn get_field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    /// Infer a schema from a batch: one field per column, typed by the first
    /// non-null value seen.
    ///
    /// Fails when a column mixes value types.
    pub fn infer(name: impl Into<String>, batch: &Batch) -> Result<Self> {
        let mut schema = Self::new(name);
        for column in batch.columns() {
            let field_type = infer_column_type(batch, &column)?;
            schema = schema.add_field(SchemaField::new(column, field_type));
        }
        Ok(schema)
    }

    /// Check a batch against this schema.
    ///
    /// Every schema column must be present, every value must fit its column
    /// type, and required columns must be non-null. Returns the batch
    /// columns that the schema does not know yet.
    pub fn check(&self, batch: &Batch) -> Result<Vec<String>> {
        for field in self.fields.values() {
            if !batch.has_column(&field.name) && !batch.is_empty() {
                return Err(CoreError::FieldNotFound(field.name.clone()));
            }
        }

        for (row, record) in batch.iter().enumerate() {
            for field in self.fields.values() {
                let value = record.get(&field.name).unwrap_or(&Value::Null);
                if field.required && value.is_null() {
                    return Err(CoreError::InvalidValue(format!(
                        "column '{}' is required but row {} is null",
                        field.name, row
                    )));
                }
                if !field.field_type.accepts(value) {
                    return Err(CoreError::TypeError(format!(
                        "column '{}' expects {} but row {} holds {}",
                        field.name,
                        field.field_type,
                        row,
                        value.type_name()
                    )));
                }
            }
        }

        Ok(batch
            .columns()
            .into_iter()
            .filter(|c| !self.fields.contains_key(c))
            .collect())
    }

    /// Widen this schema with the new columns of a batch, and settle `Any`
    /// fields whose type the batch now reveals. Returns whether anything
    /// changed.
    pub fn evolve(&mut self, batch: &Batch) -> Result<bool> {
        let mut changed = false;

        for field in self.fields.values_mut() {
            if field.field_type == FieldType::Any && batch.has_column(&field.name) {
                let observed = infer_column_type(batch, &field.name)?;
                if observed != FieldType::Any {
                    field.field_type = observed;
                    changed = true;
                }
            }
        }

        for column in batch.columns() {
            if !self.fields.contains_key(&column) {
                let field_type = infer_column_type(batch, &column)?;
                self.fields
                    .insert(column.clone(), SchemaField::new(column, field_type));
                changed = true;
            }
        }

        Ok(changed)
    }
}

fn infer_column_type(batch: &Batch, column: &str) -> Result<FieldType> {
    let mut inferred = FieldType::Any;
    for record in batch.iter() {
        let Some(value) = record.get(column) else {
            continue;
        };
        let observed = FieldType::of(value);
        if observed == FieldType::Any {
            continue;
        }
        if inferred == FieldType::Any {
            inferred = observed;
        } else if inferred != observed {
            return Err(CoreError::TypeError(format!(
                "column '{}' mixes {} and {} values",
                column, inferred, observed
            )));
        }
    }
    Ok(inferred)
}

impl SchemaField {
    /// Create a new optional field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
        }
    }

    /// Create a new required field
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: true,
            ..Self::new(name, field_type)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::Record;

    fn row(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_infer_schema() {
        let batch = Batch::new(vec![
            row(&[("source", "C1".into()), ("amount", Value::Null)]),
            row(&[("source", "C2".into()), ("amount", 4.5.into())]),
        ]);

        let schema = Schema::infer("transactions", &batch).unwrap();
        assert_eq!(schema.column_names(), vec!["source", "amount"]);
        assert_eq!(schema.get_field("amount").unwrap().field_type, FieldType::Number);
    }

    #[test]
    fn test_infer_rejects_mixed_column() {
        let batch = Batch::new(vec![
            row(&[("age", "U".into())]),
            row(&[("age", 3.into())]),
        ]);

        assert!(matches!(
            Schema::infer("t", &batch),
            Err(CoreError::TypeError(_))
        ));
    }

    #[test]
    fn test_check_reports_new_columns_and_missing_ones() {
        let schema = Schema::new("t")
            .add_field(SchemaField::required("source", FieldType::String))
            .add_field(SchemaField::new("amount", FieldType::Number));

        let wider = Batch::new(vec![row(&[
            ("source", "C1".into()),
            ("amount", 1.into()),
            ("gender", "F".into()),
        ])]);
        assert_eq!(schema.check(&wider).unwrap(), vec!["gender".to_string()]);

        let narrower = Batch::new(vec![row(&[("source", "C1".into())])]);
        assert_eq!(
            schema.check(&narrower),
            Err(CoreError::FieldNotFound("amount".to_string()))
        );

        let null_key = Batch::new(vec![row(&[("source", Value::Null), ("amount", 1.into())])]);
        assert!(matches!(
            schema.check(&null_key),
            Err(CoreError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_evolve_adds_columns() {
        let mut schema = Schema::new("t")
            .add_field(SchemaField::new("source", FieldType::String))
            .add_field(SchemaField::new("amount", FieldType::Any));

        let batch = Batch::new(vec![row(&[
            ("source", "C1".into()),
            ("amount", 2.into()),
            ("gender", "M".into()),
        ])]);

        assert!(schema.evolve(&batch).unwrap());
        assert_eq!(schema.get_field("amount").unwrap().field_type, FieldType::Number);
        assert!(schema.contains("gender"));
        assert!(!schema.evolve(&batch).unwrap());
    }
}
