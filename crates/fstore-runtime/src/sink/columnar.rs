//! Columnar target backed by Parquet files
//!
//! Layout: one directory per feature set, one `part-<run_id>.parquet` file
//! per ingestion run. Partitions are never merged or deduplicated.

use super::{Sink, SinkContext, SinkKind};
use crate::error::{Result, RuntimeError};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit as ArrowTimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use fstore_core::{Batch, FeatureRecord, Record, Value};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const PARTITION_PREFIX: &str = "part-";
const PARTITION_SUFFIX: &str = ".parquet";

/// How a run treats partitions written by earlier runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Add a fresh partition next to the existing ones
    #[default]
    Append,
    /// Remove existing partitions before writing
    Overwrite,
}

/// Parquet columnar sink
#[derive(Debug, Clone)]
pub struct ParquetSink {
    name: String,
    path: PathBuf,
    mode: WriteMode,
}

impl ParquetSink {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            mode: WriteMode::Append,
        }
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Partition files currently present, sorted by name
    pub fn partitions(&self) -> Result<Vec<PathBuf>> {
        list_partitions(&self.path).map_err(|e| RuntimeError::sink_write(&self.name, e))
    }

    /// Read every partition back as raw records (entity and timestamp
    /// columns included). Order across partitions is by file name.
    pub fn read_all(&self) -> Result<Batch> {
        let mut out = Batch::empty();
        for partition in self.partitions()? {
            let records =
                read_partition(&partition).map_err(|e| RuntimeError::sink_write(&self.name, e))?;
            for record in records {
                out.push(record);
            }
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl Sink for ParquetSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Columnar
    }

    async fn write(&self, ctx: &SinkContext, records: &[FeatureRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let prepared =
            to_record_batch(ctx, records).map_err(|e| RuntimeError::sink_write(&self.name, e))?;
        let rows = prepared.0.num_rows();
        let dir = self.path.clone();
        let mode = self.mode;
        let file_name = format!("{}{}{}", PARTITION_PREFIX, ctx.run_id, PARTITION_SUFFIX);

        let written = tokio::task::spawn_blocking(move || write_partition(&dir, &file_name, mode, &prepared))
            .await
            .map_err(|e| RuntimeError::sink_write(&self.name, format!("writer task failed: {}", e)))?
            .map_err(|e| RuntimeError::sink_write(&self.name, e))?;

        debug!(
            sink = %self.name,
            feature_set = %ctx.feature_set,
            rows,
            file = %written.display(),
            "parquet partition written"
        );
        Ok(rows)
    }
}

fn writer_properties(ctx: &SinkContext) -> WriterProperties {
    let metadata = vec![
        parquet::format::KeyValue {
            key: "feature_set".to_string(),
            value: Some(ctx.feature_set.clone()),
        },
        parquet::format::KeyValue {
            key: "schema_version".to_string(),
            value: Some(ctx.schema_version.to_string()),
        },
    ];
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(metadata))
        .build()
}

/// Column layout of a partition: entity key, timestamp, then the union of
/// feature columns in first-seen order
fn to_record_batch(
    ctx: &SinkContext,
    records: &[FeatureRecord],
) -> std::result::Result<(RecordBatch, WriterProperties), String> {
    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        for name in record.features.keys() {
            if !columns.contains(&name.as_str()) {
                columns.push(name);
            }
        }
    }

    let mut fields = vec![
        Field::new(&ctx.entity_column, DataType::Utf8, false),
        Field::new(
            &ctx.timestamp_column,
            DataType::Timestamp(ArrowTimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
    ];
    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            records.iter().map(|r| Some(r.entity_key.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(
            TimestampMicrosecondArray::from(
                records
                    .iter()
                    .map(|r| r.timestamp.timestamp_micros())
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        ),
    ];

    for name in columns {
        let values: Vec<&Value> = records
            .iter()
            .map(|r| r.features.get(name).unwrap_or(&Value::Null))
            .collect();
        let (data_type, array) = build_column(&values);
        fields.push(Field::new(name, data_type, true));
        arrays.push(array);
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| format!("record batch build failed: {}", e))?;
    Ok((batch, writer_properties(ctx)))
}

/// Pick the narrowest type every non-null value fits; mixed columns are
/// written as strings
fn build_column(values: &[&Value]) -> (DataType, ArrayRef) {
    let mut kind: Option<&'static str> = None;
    let mut mixed = false;
    for value in values.iter().filter(|v| !v.is_null()) {
        let name = value.type_name();
        match kind {
            None => kind = Some(name),
            Some(k) if k != name => mixed = true,
            _ => {}
        }
    }

    match (kind, mixed) {
        (Some("number"), false) => (
            DataType::Float64,
            Arc::new(Float64Array::from(
                values.iter().map(|v| v.as_f64()).collect::<Vec<_>>(),
            )),
        ),
        (Some("boolean"), false) => (
            DataType::Boolean,
            Arc::new(BooleanArray::from(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            )),
        ),
        (Some("timestamp"), false) => (
            DataType::Timestamp(ArrowTimeUnit::Microsecond, Some("UTC".into())),
            Arc::new(
                TimestampMicrosecondArray::from(
                    values
                        .iter()
                        .map(|v| v.to_timestamp().map(|ts| ts.timestamp_micros()))
                        .collect::<Vec<_>>(),
                )
                .with_timezone("UTC"),
            ),
        ),
        _ => (
            DataType::Utf8,
            Arc::new(StringArray::from(
                values.iter().map(|v| v.as_key()).collect::<Vec<_>>(),
            )),
        ),
    }
}

fn list_partitions(dir: &Path) -> std::result::Result<Vec<PathBuf>, String> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| format!("cannot list {}: {}", dir.display(), e))?;
    let mut partitions = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| format!("cannot list {}: {}", dir.display(), e))?
            .path();
        let is_partition = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with(PARTITION_PREFIX) && n.ends_with(PARTITION_SUFFIX));
        if is_partition {
            partitions.push(path);
        }
    }
    partitions.sort();
    Ok(partitions)
}

fn write_partition(
    dir: &Path,
    file_name: &str,
    mode: WriteMode,
    prepared: &(RecordBatch, WriterProperties),
) -> std::result::Result<PathBuf, String> {
    fs::create_dir_all(dir).map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;

    // written under a hidden name first so readers never see half a file
    let tmp = dir.join(format!(".{}.tmp", file_name));
    let target = dir.join(file_name);

    let published = write_file(&tmp, prepared).and_then(|_| {
        fs::rename(&tmp, &target).map_err(|e| format!("cannot publish {}: {}", target.display(), e))
    });
    if let Err(e) = published {
        if tmp.exists() {
            let _ = fs::remove_file(&tmp);
        }
        return Err(e);
    }

    // older partitions go only once the new one is in place
    if mode == WriteMode::Overwrite {
        let mut failed = Vec::new();
        for old in list_partitions(dir)? {
            if old == target {
                continue;
            }
            if let Err(e) = fs::remove_file(&old) {
                failed.push(format!("{}: {}", old.display(), e));
            }
        }
        if !failed.is_empty() {
            return Err(format!(
                "published {} but could not remove older partitions: {}",
                target.display(),
                failed.join("; ")
            ));
        }
    }

    Ok(target)
}

fn write_file(
    path: &Path,
    (batch, props): &(RecordBatch, WriterProperties),
) -> std::result::Result<(), String> {
    let file = File::create(path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props.clone()))
        .map_err(|e| format!("parquet writer init failed: {}", e))?;
    writer
        .write(batch)
        .map_err(|e| format!("parquet write failed: {}", e))?;
    writer
        .close()
        .map_err(|e| format!("parquet close failed: {}", e))?;
    Ok(())
}

fn read_partition(path: &Path) -> std::result::Result<Vec<Record>, String> {
    let file = File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| format!("parquet reader init failed: {}", e))?
        .build()
        .map_err(|e| format!("parquet reader build failed: {}", e))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| format!("parquet read batch failed: {}", e))?;
        let schema = batch.schema();
        for row in 0..batch.num_rows() {
            let mut record = Record::new();
            for (idx, field) in schema.fields().iter().enumerate() {
                record.insert(field.name().clone(), cell(batch.column(idx), row));
            }
            records.push(record);
        }
    }
    Ok(records)
}

fn cell(array: &ArrayRef, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    let any = array.as_any();
    if let Some(a) = any.downcast_ref::<Float64Array>() {
        Value::Number(a.value(row))
    } else if let Some(a) = any.downcast_ref::<BooleanArray>() {
        Value::Bool(a.value(row))
    } else if let Some(a) = any.downcast_ref::<TimestampMicrosecondArray>() {
        DateTime::from_timestamp_micros(a.value(row))
            .map(Value::Timestamp)
            .unwrap_or(Value::Null)
    } else if let Some(a) = any.downcast_ref::<StringArray>() {
        Value::String(a.value(row).to_string())
    } else {
        Value::Null
    }
}
