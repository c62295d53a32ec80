//! Common test utilities for SDK integration tests

use std::path::{Path, PathBuf};

/// Transactions in the layout of the original export: a leading row index,
/// single-quoted strings and a `YYYY-MM-DD HH:MM:SS` timestamp
pub const TRANSACTIONS_CSV: &str = "\
,source,age,category,amount,fraud,timestamp
0,'C1','4','es_food',10.0,0,'2024-01-01 00:00:00'
1,'C2','U','es_other',7.0,1,'2024-01-01 01:00:00'
2,'C1','U','es_tech',20.0,0,'2024-01-01 00:30:00'
3,'C1','4','es_food',5.0,1,'2024-01-01 03:00:00'
";

pub const PIPELINE_YAML: &str = r#"
feature_sets:
  - name: transactions
    entity: source
    source:
      path: transactions.csv
      quote: "'"
      index_col: 0
      parse_dates: [timestamp]
      sort_by: source
    steps:
      - kind: map_values
        mapping:
          age: { U: "0" }
        with_original_features: true
      - kind: one_hot_encoder
        mapping:
          category: [es_food, es_tech]
    aggregations:
      - name: amount
        column: amount
        operations: [sum, max]
        windows: [2h]
        period: 1h
    targets:
      - kind: parquet
        path: transactions
      - kind: memory
        name: online
  - name: labels
    entity: source
    source:
      path: transactions.csv
      quote: "'"
      index_col: 0
      parse_dates: [timestamp]
    steps:
      - name: create_labels
        kind: custom
        handler: create_labels
    targets:
      - kind: memory
        name: labels_online
"#;

/// Write the fixture pipeline and its source next to each other
pub fn write_fixtures(dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::write(dir.join("transactions.csv"), TRANSACTIONS_CSV)?;
    let pipeline = dir.join("pipeline.yaml");
    std::fs::write(&pipeline, PIPELINE_YAML)?;
    Ok(pipeline)
}
