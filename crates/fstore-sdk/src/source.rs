//! Delimited-text batch source
//!
//! Reads a CSV file into a [`Batch`], typing each column as a whole:
//! `parse_dates` columns become timestamps, columns whose non-empty cells all
//! parse as numbers become numbers, all-`true`/`false` columns become
//! booleans, and everything else stays a string. Empty cells are null.

use crate::config::SourceConfig;
use crate::error::{Result, SdkError};
use fstore_core::types::value::parse_timestamp;
use fstore_core::{Batch, Record, Value};
use fstore_runtime::TemporalAligner;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Timestamp,
    Number,
    Boolean,
    Text,
}

fn byte(c: char, what: &str) -> Result<u8> {
    u8::try_from(c).map_err(|_| SdkError::ConfigError(format!("{} '{}' must be ASCII", what, c)))
}

/// Read a CSV file with the source's parsing options
pub fn read_csv(path: &Path, options: &SourceConfig) -> Result<Batch> {
    let file = std::fs::File::open(path)
        .map_err(|e| SdkError::SourceError(format!("cannot open {}: {}", path.display(), e)))?;
    let batch = read_csv_from(file, options)?;
    info!(path = %path.display(), rows = batch.len(), "source loaded");
    Ok(batch)
}

/// Read CSV from any reader
pub fn read_csv_from<R: Read>(reader: R, options: &SourceConfig) -> Result<Batch> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(byte(options.delimiter, "delimiter")?)
        .quote(byte(options.quote, "quote")?)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let keep: Vec<usize> = (0..headers.len())
        .filter(|i| Some(*i) != options.index_col)
        .collect();

    for column in &options.parse_dates {
        if !keep.iter().any(|&i| &headers[i] == column) {
            return Err(SdkError::SourceError(format!(
                "parse_dates column '{}' is not in the file",
                column
            )));
        }
    }

    let mut rows = Vec::new();
    for row in reader.records() {
        rows.push(row?);
    }

    let mut kinds = Vec::with_capacity(keep.len());
    for &i in &keep {
        let cells = rows.iter().filter_map(|r| r.get(i)).filter(|c| !c.is_empty());
        let kind = if options.parse_dates.contains(&headers[i]) {
            ColumnKind::Timestamp
        } else {
            infer_kind(cells)
        };
        kinds.push(kind);
    }

    let mut batch = Batch::empty();
    for (line, row) in rows.iter().enumerate() {
        let mut record = Record::with_capacity(keep.len());
        for (&i, kind) in keep.iter().zip(&kinds) {
            let cell = row.get(i).unwrap_or("");
            let value = typed(cell, *kind).ok_or_else(|| {
                SdkError::SourceError(format!(
                    "row {} column '{}': '{}' is not a timestamp",
                    line + 1,
                    headers[i],
                    cell
                ))
            })?;
            record.insert(headers[i].clone(), value);
        }
        batch.push(record);
    }

    debug!(
        columns = keep.len(),
        rows = batch.len(),
        "csv parsed"
    );
    Ok(batch)
}

fn infer_kind<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnKind {
    let mut numeric = true;
    let mut boolean = true;
    let mut seen = false;
    for cell in cells {
        seen = true;
        numeric &= cell.parse::<f64>().is_ok();
        boolean &= cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false");
        if !numeric && !boolean {
            return ColumnKind::Text;
        }
    }
    match (seen, numeric, boolean) {
        (false, _, _) => ColumnKind::Text,
        (true, true, _) => ColumnKind::Number,
        (true, _, true) => ColumnKind::Boolean,
        _ => ColumnKind::Text,
    }
}

/// `None` only for a timestamp cell that does not parse
fn typed(cell: &str, kind: ColumnKind) -> Option<Value> {
    if cell.is_empty() {
        return Some(Value::Null);
    }
    match kind {
        ColumnKind::Timestamp => parse_timestamp(cell).map(Value::Timestamp),
        ColumnKind::Number => cell.parse::<f64>().ok().map(Value::Number),
        ColumnKind::Boolean => Some(Value::Bool(cell.eq_ignore_ascii_case("true"))),
        ColumnKind::Text => Some(Value::String(cell.to_string())),
    }
}

/// Apply the source's preprocessing: sort, limit, then temporal alignment
pub fn prepare(mut batch: Batch, options: &SourceConfig, timestamp_key: &str) -> Result<Batch> {
    if let Some(column) = &options.sort_by {
        if !batch.is_empty() && !batch.has_column(column) {
            return Err(SdkError::SourceError(format!(
                "sort_by column '{}' is not in the batch",
                column
            )));
        }
        batch.sort_by_column(column);
    }
    if let Some(limit) = options.limit {
        batch.truncate(limit);
    }
    if let Some(window) = options.align {
        let before = batch.len();
        batch = TemporalAligner::new(timestamp_key, window).align(batch)?;
        debug!(window = %window, before, after = batch.len(), "source aligned");
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const EVENTS: &str = "\
,source,event,timestamp
0,'C1','details_change','2024-01-01 00:00:00'
1,'C2','login','2024-01-01 00:05:00'
2,'C1','password_change','2024-01-01 00:10:00'
";

    #[test]
    fn test_index_column_dropped_and_quotes_stripped() {
        let mut options = SourceConfig::new("events.csv");
        options.index_col = Some(0);
        options.quote = '\'';
        options.parse_dates = vec!["timestamp".to_string()];

        let batch = read_csv_from(EVENTS.as_bytes(), &options).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.columns(), vec!["source", "event", "timestamp"]);

        let first = &batch.records()[0];
        assert_eq!(first["source"], Value::from("C1"));
        assert_eq!(
            first["timestamp"],
            Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_column_types_inferred_as_a_whole() {
        let csv = "step,age,amount,fraud,note\n0,4,4.55,false,\n1,U,39.68,true,x\n";
        let batch = read_csv_from(csv.as_bytes(), &SourceConfig::new("t.csv")).unwrap();

        let rows = batch.records();
        assert_eq!(rows[0]["step"], Value::Number(0.0));
        assert_eq!(rows[0]["age"], Value::from("4"));
        assert_eq!(rows[1]["age"], Value::from("U"));
        assert_eq!(rows[1]["amount"], Value::Number(39.68));
        assert_eq!(rows[1]["fraud"], Value::Bool(true));
        assert_eq!(rows[0]["note"], Value::Null);
        assert_eq!(rows[1]["note"], Value::from("x"));
    }

    #[test]
    fn test_bad_date_is_a_source_error() {
        let csv = "source,timestamp\nA,not-a-date\n";
        let mut options = SourceConfig::new("t.csv");
        options.parse_dates = vec!["timestamp".to_string()];
        assert!(matches!(
            read_csv_from(csv.as_bytes(), &options),
            Err(SdkError::SourceError(_))
        ));

        options.parse_dates = vec!["missing".to_string()];
        assert!(matches!(
            read_csv_from(csv.as_bytes(), &options),
            Err(SdkError::SourceError(_))
        ));
    }

    #[test]
    fn test_sort_then_limit() {
        let csv = "source,timestamp\nC,2024-01-01\nA,2024-01-02\nB,2024-01-03\nA,2024-01-04\n";
        let batch = read_csv_from(csv.as_bytes(), &SourceConfig::new("t.csv")).unwrap();

        let mut options = SourceConfig::new("t.csv");
        options.sort_by = Some("source".to_string());
        options.limit = Some(3);
        let prepared = prepare(batch, &options, "timestamp").unwrap();

        let sources: Vec<&str> = prepared
            .iter()
            .map(|r| r["source"].as_str().unwrap())
            .collect();
        assert_eq!(sources, vec!["A", "A", "B"]);
        assert_eq!(prepared.records()[0]["timestamp"], Value::from("2024-01-02"));
    }
}
