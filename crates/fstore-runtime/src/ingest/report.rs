//! Ingestion run reports

use crate::ingest::IngestStage;
use crate::sink::{SinkContext, SinkKind};
use crate::transform::VocabularyMisses;
use chrono::{DateTime, Utc};
use fstore_core::FeatureRecord;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of one sink write
#[derive(Debug, Clone, Serialize)]
pub struct SinkOutcome {
    pub sink: String,
    pub kind: SinkKind,
    pub rows_written: usize,
    pub elapsed_ms: u64,
    /// Failure message; `None` when the write succeeded
    pub error: Option<String>,
}

impl SinkOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Overall result of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every sink accepted the records (or there were no sinks)
    Succeeded,
    /// Some sinks failed; retry them with [`crate::IngestionCoordinator::retry_failed`]
    PartialFailure,
    AllSinksFailed,
}

/// Structured result of an ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub feature_set: String,
    pub schema_version: u32,
    pub stage: IngestStage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input_rows: usize,
    pub output_rows: usize,
    pub vocabulary_misses: VocabularyMisses,
    pub sinks: Vec<SinkOutcome>,

    #[serde(skip)]
    pub(crate) context: Arc<SinkContext>,

    #[serde(skip)]
    pub(crate) records: Arc<Vec<FeatureRecord>>,
}

impl IngestReport {
    pub fn status(&self) -> RunStatus {
        let failed = self.sinks.iter().filter(|s| !s.succeeded()).count();
        if failed == 0 {
            RunStatus::Succeeded
        } else if failed == self.sinks.len() {
            RunStatus::AllSinksFailed
        } else {
            RunStatus::PartialFailure
        }
    }

    /// Names of the sinks whose write failed
    pub fn failed_sinks(&self) -> Vec<&str> {
        self.sinks
            .iter()
            .filter(|s| !s.succeeded())
            .map(|s| s.sink.as_str())
            .collect()
    }

    pub fn sink(&self, name: &str) -> Option<&SinkOutcome> {
        self.sinks.iter().find(|s| s.sink == name)
    }

    /// Feature records produced by the run, in write order
    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn total_vocabulary_misses(&self) -> u64 {
        self.vocabulary_misses.values().sum()
    }
}
