//! Temporal alignment of historical datasets
//!
//! Window aggregations assume recent data. Replaying a historical dump
//! through them requires moving its timeline up to the present first: the
//! aligner shifts every timestamp by one offset so the newest record lands a
//! safety margin before "now", then keeps only the trailing window.

use crate::error::{Result, RuntimeError};
use chrono::{DateTime, Duration, Utc};
use fstore_core::{Batch, TimeSpan, Value};
use tracing::debug;

/// Default gap kept between the newest shifted record and "now"
pub const DEFAULT_SAFETY_MARGIN_MINUTES: i64 = 5;

/// Shifts a dataset's timestamps forward to end just before "now"
#[derive(Debug, Clone)]
pub struct TemporalAligner {
    timestamp_column: String,
    window: TimeSpan,
    safety_margin: Duration,
}

impl TemporalAligner {
    pub fn new(timestamp_column: impl Into<String>, window: TimeSpan) -> Self {
        Self {
            timestamp_column: timestamp_column.into(),
            window,
            safety_margin: Duration::minutes(DEFAULT_SAFETY_MARGIN_MINUTES),
        }
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn window(&self) -> TimeSpan {
        self.window
    }

    /// Align against the wall clock
    pub fn align(&self, batch: Batch) -> Result<Batch> {
        self.align_at(batch, Utc::now())
    }

    /// Align against an explicit "now".
    ///
    /// Records whose shifted timestamp is at or after `now - window` are
    /// kept, in their original order.
    pub fn align_at(&self, batch: Batch, now: DateTime<Utc>) -> Result<Batch> {
        if batch.is_empty() {
            return Ok(batch);
        }

        let mut timestamps = Vec::with_capacity(batch.len());
        for (row, record) in batch.iter().enumerate() {
            let ts = record
                .get(&self.timestamp_column)
                .and_then(Value::to_timestamp)
                .ok_or_else(|| {
                    RuntimeError::Schema(format!(
                        "row {} has no parseable timestamp in column '{}'",
                        row, self.timestamp_column
                    ))
                })?;
            timestamps.push(ts);
        }

        // Non-empty, checked above
        let max_time = timestamps.iter().copied().max().unwrap_or(now);
        let shift = now
            .signed_duration_since(max_time)
            .checked_sub(&self.safety_margin)
            .ok_or_else(|| {
                RuntimeError::InvalidConfig(format!(
                    "safety margin {} is out of range",
                    self.safety_margin
                ))
            })?;
        // A window reaching past the earliest representable instant keeps everything
        let start_time = now
            .checked_sub_signed(self.window.to_chrono())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let total = batch.len();
        let mut aligned = Vec::with_capacity(total);
        for (mut record, ts) in batch.into_iter().zip(timestamps) {
            let shifted = ts.checked_add_signed(shift).ok_or_else(|| {
                RuntimeError::Schema(format!(
                    "timestamp {} is out of range after shifting by {}",
                    ts, shift
                ))
            })?;
            if shifted < start_time {
                continue;
            }
            record.insert(self.timestamp_column.clone(), Value::Timestamp(shifted));
            aligned.push(record);
        }
        let aligned = Batch::new(aligned);

        debug!(
            column = %self.timestamp_column,
            shift_secs = shift.num_seconds(),
            kept = aligned.len(),
            dropped = total - aligned.len(),
            "aligned dataset to trailing window {}",
            self.window
        );

        Ok(aligned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fstore_core::{Record, TimeUnit};

    fn record_at(ts: DateTime<Utc>, id: i32) -> Record {
        let mut record = Record::new();
        record.insert("id".to_string(), id.into());
        record.insert("timestamp".to_string(), Value::Timestamp(ts));
        record
    }

    #[test]
    fn test_empty_batch_is_returned_unchanged() {
        let aligner = TemporalAligner::new("timestamp", TimeSpan::days(2));
        let aligned = aligner.align(Batch::empty()).unwrap();
        assert!(aligned.is_empty());
    }

    #[test]
    fn test_shifts_newest_record_to_just_before_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let newest = now - Duration::days(30);
        let batch = Batch::new(vec![
            record_at(newest - Duration::days(3), 1),
            record_at(newest - Duration::hours(47), 2),
            record_at(newest - Duration::hours(1), 3),
            record_at(newest, 4),
        ]);

        let aligner = TemporalAligner::new("timestamp", TimeSpan::days(2));
        let aligned = aligner.align_at(batch, now).unwrap();

        let ids: Vec<f64> = aligned.iter().map(|r| r["id"].as_f64().unwrap()).collect();
        assert_eq!(ids, vec![2.0, 3.0, 4.0]);

        let max = aligned
            .iter()
            .filter_map(|r| r["timestamp"].to_timestamp())
            .max()
            .unwrap();
        assert_eq!(max, now - Duration::minutes(5));

        for record in aligned.iter() {
            let ts = record["timestamp"].to_timestamp().unwrap();
            assert!(ts >= now - Duration::days(2) && ts <= now);
        }
    }

    #[test]
    fn test_parses_string_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut record = Record::new();
        record.insert("timestamp".to_string(), "2019-01-01 00:00:00".into());

        let aligner = TemporalAligner::new("timestamp", TimeSpan::hours(1))
            .with_safety_margin(Duration::zero());
        let aligned = aligner.align_at(Batch::new(vec![record]), now).unwrap();

        assert_eq!(aligned.records()[0]["timestamp"], Value::Timestamp(now));
    }

    #[test]
    fn test_window_longer_than_history_keeps_everything() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let batch = Batch::new(vec![
            record_at(now - Duration::days(4000), 1),
            record_at(now - Duration::days(1), 2),
        ]);

        let aligner = TemporalAligner::new("timestamp", TimeSpan::new(u64::MAX, TimeUnit::Weeks));
        let aligned = aligner.align_at(batch, now).unwrap();
        assert_eq!(aligned.len(), 2);
    }

    #[test]
    fn test_missing_timestamp_is_a_schema_error() {
        let mut record = Record::new();
        record.insert("id".to_string(), 1.into());

        let aligner = TemporalAligner::new("timestamp", TimeSpan::days(2));
        let err = aligner.align(Batch::new(vec![record])).unwrap_err();
        assert!(matches!(err, RuntimeError::Schema(_)));
    }
}
