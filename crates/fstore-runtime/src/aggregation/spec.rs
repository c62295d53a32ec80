//! Aggregation specifications
//!
//! Declared per feature set, validated when added, never at ingestion time.

use crate::error::{Result, RuntimeError};
use fstore_core::TimeSpan;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Reducer applied over a trailing window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationOp {
    Sum,
    Avg,
    Count,
    Max,
    Min,
}

impl AggregationOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationOp::Sum => "sum",
            AggregationOp::Avg => "avg",
            AggregationOp::Count => "count",
            AggregationOp::Max => "max",
            AggregationOp::Min => "min",
        }
    }
}

impl fmt::Display for AggregationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One windowed aggregate feature family
///
/// Produces one output column per (operation, window):
/// `<name>_<op>_<window>`, e.g. `amount_sum_2h`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    /// Feature name prefix
    pub name: String,

    /// Source column
    pub column: String,

    /// Reducers, in output order
    pub operations: Vec<AggregationOp>,

    /// Trailing windows, in output order
    pub windows: Vec<TimeSpan>,

    /// Granularity at which rolling state is bucketed
    pub period: TimeSpan,
}

impl AggregationSpec {
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        operations: impl IntoIterator<Item = AggregationOp>,
        windows: impl IntoIterator<Item = TimeSpan>,
        period: TimeSpan,
    ) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            operations: operations.into_iter().collect(),
            windows: windows.into_iter().collect(),
            period,
        }
    }

    /// Build from the string form used in pipeline configuration,
    /// e.g. `windows = ["2h", "12h"]`, `period = "1h"`.
    pub fn parse(
        name: impl Into<String>,
        column: impl Into<String>,
        operations: impl IntoIterator<Item = AggregationOp>,
        windows: &[&str],
        period: &str,
    ) -> Result<Self> {
        let name = name.into();
        let bad = |e: fstore_core::CoreError| {
            RuntimeError::AggregationConfig(format!("aggregation '{}': {}", name, e))
        };
        let windows = windows
            .iter()
            .map(|w| TimeSpan::parse(w).map_err(bad))
            .collect::<Result<Vec<_>>>()?;
        let period = TimeSpan::parse(period).map_err(bad)?;

        let spec = Self::new(name.clone(), column, operations, windows, period);
        spec.validate()?;
        Ok(spec)
    }

    /// Whether any reducer needs numeric input
    pub fn needs_numeric(&self) -> bool {
        self.operations.iter().any(|op| *op != AggregationOp::Count)
    }

    /// Output column names, operations first then windows
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.operations.len() * self.windows.len());
        for op in &self.operations {
            for window in &self.windows {
                columns.push(output_column(&self.name, *op, window));
            }
        }
        columns
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| {
            Err(RuntimeError::AggregationConfig(format!(
                "aggregation '{}': {}",
                self.name, message
            )))
        };

        if self.name.trim().is_empty() {
            return Err(RuntimeError::AggregationConfig(
                "aggregation name cannot be empty".to_string(),
            ));
        }
        if self.column.trim().is_empty() {
            return fail("source column cannot be empty".to_string());
        }
        if self.operations.is_empty() {
            return fail("at least one operation is required".to_string());
        }
        if self.windows.is_empty() {
            return fail("at least one window is required".to_string());
        }

        let mut ops = HashSet::new();
        for op in &self.operations {
            if !ops.insert(op) {
                return fail(format!("operation '{}' listed twice", op));
            }
        }

        for span in self.windows.iter().chain(std::iter::once(&self.period)) {
            if let Err(e) = TimeSpan::try_new(span.value, span.unit) {
                return fail(e.to_string());
            }
        }
        let period = self.period.as_seconds();

        let mut windows = HashSet::new();
        for window in &self.windows {
            let seconds = window.as_seconds();
            if !windows.insert(seconds) {
                return fail(format!("window '{}' listed twice", window));
            }
            if seconds < period || seconds % period != 0 {
                return fail(format!(
                    "window '{}' is not a whole multiple of period '{}'",
                    window, self.period
                ));
            }
        }

        Ok(())
    }
}

pub(crate) fn output_column(name: &str, op: AggregationOp, window: &TimeSpan) -> String {
    format!("{}_{}_{}", name, op, window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use AggregationOp::*;

    #[test]
    fn test_output_columns_order() {
        let spec = AggregationSpec::parse("amount", "amount", [Avg, Sum], &["2h", "12h"], "1h")
            .unwrap();
        assert_eq!(
            spec.output_columns(),
            vec!["amount_avg_2h", "amount_avg_12h", "amount_sum_2h", "amount_sum_12h"]
        );
    }

    #[test]
    fn test_window_must_be_multiple_of_period() {
        let err = AggregationSpec::parse("amount", "amount", [Sum], &["90m"], "1h").unwrap_err();
        assert!(matches!(err, RuntimeError::AggregationConfig(_)));

        let err = AggregationSpec::parse("amount", "amount", [Sum], &["1h"], "1d").unwrap_err();
        assert!(err.to_string().contains("whole multiple"));

        assert!(AggregationSpec::parse("amount", "amount", [Sum], &["14d"], "1d").is_ok());
        assert!(AggregationSpec::parse("amount", "amount", [Sum], &["2m"], "1m").is_ok());
    }

    #[test]
    fn test_malformed_specs_are_rejected() {
        assert!(AggregationSpec::parse("amount", "amount", [Sum], &["2x"], "1h").is_err());
        assert!(AggregationSpec::parse("amount", "amount", [Sum], &[], "1h").is_err());
        assert!(AggregationSpec::parse("amount", "amount", [], &["2h"], "1h").is_err());
        assert!(AggregationSpec::parse("amount", "amount", [Sum, Sum], &["2h"], "1h").is_err());
        assert!(AggregationSpec::parse("amount", "amount", [Sum], &["2h", "120m"], "1h").is_err());
        assert!(AggregationSpec::parse("", "amount", [Sum], &["2h"], "1h").is_err());
    }

    #[test]
    fn test_oversized_windows_are_rejected() {
        let err =
            AggregationSpec::parse("amount", "amount", [Sum], &["40000000000000w"], "1h").unwrap_err();
        assert!(matches!(err, RuntimeError::AggregationConfig(_)));
        assert!(err.to_string().contains("too large"));

        assert!(AggregationSpec::parse("amount", "amount", [Sum], &["20000000000000s"], "1s").is_err());

        let spec = AggregationSpec::new(
            "amount",
            "amount",
            [Sum],
            [TimeSpan::new(u64::MAX, fstore_core::TimeUnit::Weeks)],
            TimeSpan::hours(1),
        );
        assert!(matches!(spec.validate(), Err(RuntimeError::AggregationConfig(_))));

        let zero_period =
            AggregationSpec::new("amount", "amount", [Sum], [TimeSpan::hours(1)], TimeSpan::hours(0));
        assert!(zero_period.validate().is_err());
    }

    #[test]
    fn test_needs_numeric() {
        let counts = AggregationSpec::parse("events", "event", [Count], &["1d"], "1h").unwrap();
        assert!(!counts.needs_numeric());

        let sums = AggregationSpec::parse("amount", "amount", [Count, Max], &["1d"], "1h").unwrap();
        assert!(sums.needs_numeric());
    }
}
