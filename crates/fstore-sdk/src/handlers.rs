//! Handlers shipped with the SDK for `custom` pipeline steps

use fstore_core::{Batch, Record, Value};
use fstore_runtime::{HandlerRegistry, Result, RuntimeError};

/// Registry holding every shipped handler under its pipeline name
pub fn builtin_handlers() -> HandlerRegistry {
    HandlerRegistry::new().with("create_labels", create_labels)
}

/// Reduce a transactions batch to the entity key, timestamp and a 0/1
/// `label` taken from `fraud`
pub fn create_labels(batch: Batch) -> Result<Batch> {
    let mut labels = Batch::empty();
    for (row, record) in batch.iter().enumerate() {
        let label = match record.get("fraud") {
            Some(Value::Bool(fraud)) => u8::from(*fraud),
            Some(Value::Number(n)) if *n == 0.0 || *n == 1.0 => *n as u8,
            other => {
                return Err(RuntimeError::Transform {
                    step: "create_labels".to_string(),
                    message: format!("row {}: fraud must be 0/1 or a boolean, got {:?}", row, other),
                })
            }
        };

        let mut out = Record::new();
        for column in ["source", "timestamp"] {
            if let Some(value) = record.get(column) {
                out.insert(column.to_string(), value.clone());
            }
        }
        out.insert("label".to_string(), Value::Number(f64::from(label)));
        labels.push(out);
    }
    Ok(labels)
}
