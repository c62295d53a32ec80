//! Date-part extraction step

use crate::error::{Result, RuntimeError};
use crate::transform::require_columns;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use fstore_core::{Batch, Value};
use serde::{Deserialize, Serialize};

/// Calendar component derived from a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    /// Monday = 0 .. Sunday = 6
    DayOfWeek,
    DayOfYear,
    /// ISO week number
    WeekOfYear,
    Quarter,
    IsWeekend,
}

impl DatePart {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Month => "month",
            DatePart::Day => "day",
            DatePart::Hour => "hour",
            DatePart::Minute => "minute",
            DatePart::Second => "second",
            DatePart::DayOfWeek => "day_of_week",
            DatePart::DayOfYear => "day_of_year",
            DatePart::WeekOfYear => "week_of_year",
            DatePart::Quarter => "quarter",
            DatePart::IsWeekend => "is_weekend",
        }
    }

    fn extract(&self, ts: &DateTime<Utc>) -> Value {
        let n = match self {
            DatePart::Year => ts.year() as f64,
            DatePart::Month => ts.month() as f64,
            DatePart::Day => ts.day() as f64,
            DatePart::Hour => ts.hour() as f64,
            DatePart::Minute => ts.minute() as f64,
            DatePart::Second => ts.second() as f64,
            DatePart::DayOfWeek => ts.weekday().num_days_from_monday() as f64,
            DatePart::DayOfYear => ts.ordinal() as f64,
            DatePart::WeekOfYear => ts.iso_week().week() as f64,
            DatePart::Quarter => ((ts.month() - 1) / 3 + 1) as f64,
            DatePart::IsWeekend => {
                return Value::Bool(matches!(ts.weekday(), Weekday::Sat | Weekday::Sun))
            }
        };
        Value::Number(n)
    }
}

fn default_timestamp_col() -> String {
    "timestamp".to_string()
}

/// Derives `<timestamp_col>_<part>` columns from a timestamp column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateExtractor {
    pub parts: Vec<DatePart>,

    #[serde(default = "default_timestamp_col")]
    pub timestamp_col: String,
}

impl DateExtractor {
    pub fn new(parts: impl IntoIterator<Item = DatePart>, timestamp_col: impl Into<String>) -> Self {
        Self {
            parts: parts.into_iter().collect(),
            timestamp_col: timestamp_col.into(),
        }
    }

    pub fn output_columns(&self) -> Vec<String> {
        self.parts
            .iter()
            .map(|p| format!("{}_{}", self.timestamp_col, p.as_str()))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.parts.is_empty() {
            return Err(RuntimeError::InvalidConfig(
                "date_extractor needs at least one part".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn apply(&self, step: &str, mut batch: Batch) -> Result<Batch> {
        require_columns(step, &batch, std::iter::once(&self.timestamp_col))?;
        let outputs = self.output_columns();

        for (row, record) in batch.records_mut().iter_mut().enumerate() {
            let raw = record.get(&self.timestamp_col).unwrap_or(&Value::Null);
            let ts = match raw {
                Value::Null => None,
                other => Some(other.to_timestamp().ok_or_else(|| RuntimeError::Transform {
                    step: step.to_string(),
                    message: format!(
                        "row {}: '{}' in column '{}' is not a timestamp",
                        row, other, self.timestamp_col
                    ),
                })?),
            };

            for (part, column) in self.parts.iter().zip(&outputs) {
                let value = ts.as_ref().map(|t| part.extract(t)).unwrap_or(Value::Null);
                record.insert(column.clone(), value);
            }
        }

        Ok(batch)
    }
}
