//! Ingestion coordinator
//!
//! Drives one run for a feature set through
//! `Validating -> Transforming -> Aggregating -> Writing -> Completed`.
//! Any fatal error ends the run in `Failed` before a single sink is written.
//! Sink writes run concurrently and fail independently.

mod report;

pub use report::{IngestReport, RunStatus, SinkOutcome};

use crate::error::{Result, RuntimeError};
use crate::feature_set::FeatureSet;
use crate::sink::{Sink, SinkContext};
use chrono::Utc;
use fstore_core::{Batch, FeatureRecord};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Stage of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Validating,
    Transforming,
    Aggregating,
    Writing,
    Completed,
    Failed,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngestStage::Validating => "validating",
            IngestStage::Transforming => "transforming",
            IngestStage::Aggregating => "aggregating",
            IngestStage::Writing => "writing",
            IngestStage::Completed => "completed",
            IngestStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Runs ingestion for feature sets and fans records out to sinks
#[derive(Debug, Clone, Default)]
pub struct IngestionCoordinator {
    sink_timeout: Option<Duration>,
}

impl IngestionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every sink write; a write that overruns fails that sink only
    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = Some(timeout);
        self
    }

    /// Ingest one batch into a feature set and write it to every sink.
    ///
    /// The exclusive borrow keeps runs on one feature set serialized.
    pub async fn ingest(
        &self,
        set: &mut FeatureSet,
        batch: Batch,
        sinks: &[Arc<dyn Sink>],
    ) -> Result<IngestReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let input_rows = batch.len();
        let name = set.name().to_string();
        let fail = |stage: IngestStage| {
            let name = name.clone();
            move |source: RuntimeError| {
                warn!(feature_set = %name, run_id = %run_id, stage = %stage, error = %source, "ingestion failed");
                RuntimeError::IngestionFailed {
                    feature_set: name,
                    stage,
                    source: Box::new(source),
                }
            }
        };

        info!(feature_set = %name, run_id = %run_id, rows = input_rows, sinks = sinks.len(), "ingestion started");

        // Validating
        check_sink_names(sinks).map_err(fail(IngestStage::Validating))?;
        set.validate().map_err(fail(IngestStage::Validating))?;
        let schema_update = set
            .reconcile_schema(&batch)
            .map_err(fail(IngestStage::Validating))?;
        let schema_version = schema_update
            .as_ref()
            .map_or(set.version(), |update| update.version);

        // Transforming
        debug!(feature_set = %name, run_id = %run_id, "transforming");
        let transformed = set.graph().run(batch).map_err(fail(IngestStage::Transforming))?;
        for (column, misses) in &transformed.vocabulary_misses {
            warn!(feature_set = %name, run_id = %run_id, column = %column, misses, "values outside vocabulary");
        }

        // Aggregating
        let key_column = set.entity().key_column.clone();
        let timestamp_column = set.timestamp_key().to_string();
        let enriched = if set.aggregations().is_empty() {
            transformed.batch
        } else {
            debug!(feature_set = %name, run_id = %run_id, specs = set.aggregations().specs().len(), "aggregating");
            set.aggregations()
                .run(transformed.batch, &key_column, &timestamp_column)
                .map_err(fail(IngestStage::Aggregating))?
        };
        let records = set
            .feature_records(&enriched)
            .map_err(fail(IngestStage::Aggregating))?;

        // Writing
        let context = Arc::new(SinkContext {
            feature_set: name.clone(),
            schema_version,
            run_id,
            entity_column: key_column,
            timestamp_column,
        });
        let records = Arc::new(records);
        debug!(feature_set = %name, run_id = %run_id, rows = records.len(), "writing");
        let outcomes = self.write_all(&context, &records, sinks).await;

        if let Some(update) = schema_update {
            set.commit_schema(update);
        }

        let report = IngestReport {
            run_id,
            feature_set: name,
            schema_version,
            stage: IngestStage::Completed,
            started_at,
            finished_at: Utc::now(),
            input_rows,
            output_rows: records.len(),
            vocabulary_misses: transformed.vocabulary_misses,
            sinks: outcomes,
            context,
            records,
        };

        info!(
            feature_set = %report.feature_set,
            run_id = %run_id,
            rows = report.output_rows,
            status = ?report.status(),
            "ingestion completed"
        );
        Ok(report)
    }

    /// Re-attempt only the sinks that failed in `report`, with the records
    /// of that run. Sinks not named as failed are ignored.
    pub async fn retry_failed(
        &self,
        report: &IngestReport,
        sinks: &[Arc<dyn Sink>],
    ) -> Result<IngestReport> {
        let failed: HashSet<&str> = report.failed_sinks().into_iter().collect();
        let retry: Vec<Arc<dyn Sink>> = sinks
            .iter()
            .filter(|s| failed.contains(s.name()))
            .cloned()
            .collect();

        let mut updated = report.clone();
        if retry.is_empty() {
            return Ok(updated);
        }
        check_sink_names(&retry)?;

        info!(
            feature_set = %report.feature_set,
            run_id = %report.run_id,
            sinks = retry.len(),
            "retrying failed sinks"
        );
        for outcome in self.write_all(&report.context, &report.records, &retry).await {
            if let Some(slot) = updated.sinks.iter_mut().find(|s| s.sink == outcome.sink) {
                *slot = outcome;
            }
        }
        updated.finished_at = Utc::now();
        Ok(updated)
    }

    async fn write_all(
        &self,
        context: &Arc<SinkContext>,
        records: &Arc<Vec<FeatureRecord>>,
        sinks: &[Arc<dyn Sink>],
    ) -> Vec<SinkOutcome> {
        let timeout = self.sink_timeout;
        let handles = sinks.iter().map(|sink| {
            let sink = Arc::clone(sink);
            let context = Arc::clone(context);
            let records = Arc::clone(records);
            tokio::spawn(async move {
                let started = Instant::now();
                let result = match timeout {
                    Some(limit) => {
                        match tokio::time::timeout(limit, sink.write(&context, &records)).await {
                            Ok(result) => result,
                            Err(_) => Err(RuntimeError::SinkTimeout {
                                sink: sink.name().to_string(),
                                timeout_ms: limit.as_millis() as u64,
                            }),
                        }
                    }
                    None => sink.write(&context, &records).await,
                };
                (result, started.elapsed())
            })
        });
        let joined = join_all(handles).await;

        sinks
            .iter()
            .zip(joined)
            .map(|(sink, joined)| {
                let (result, elapsed) = match joined {
                    Ok(done) => done,
                    Err(e) => (
                        Err(RuntimeError::sink_write(sink.name(), format!("sink task aborted: {}", e))),
                        Duration::ZERO,
                    ),
                };
                let elapsed_ms = elapsed.as_millis() as u64;
                match result {
                    Ok(rows) => {
                        info!(sink = %sink.name(), feature_set = %context.feature_set, rows, elapsed_ms, "sink write succeeded");
                        SinkOutcome {
                            sink: sink.name().to_string(),
                            kind: sink.kind(),
                            rows_written: rows,
                            elapsed_ms,
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!(sink = %sink.name(), feature_set = %context.feature_set, error = %e, "sink write failed");
                        SinkOutcome {
                            sink: sink.name().to_string(),
                            kind: sink.kind(),
                            rows_written: 0,
                            elapsed_ms,
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect()
    }
}

fn check_sink_names(sinks: &[Arc<dyn Sink>]) -> Result<()> {
    let mut seen = HashSet::new();
    for sink in sinks {
        if !seen.insert(sink.name()) {
            return Err(RuntimeError::InvalidConfig(format!(
                "sink name '{}' is used twice",
                sink.name()
            )));
        }
    }
    Ok(())
}
